//! Test helper modules for hv-session integration tests
//!
//! Provides reusable test infrastructure components:
//! - MockTransport: in-memory transport recording everything sent
//! - Audio generators: WAV and raw PCM payloads with known content

#![allow(dead_code)]

pub mod audio_generator;
pub mod mock_transport;

pub use audio_generator::{constant_pcm, sine_pcm, sine_wav_bytes};
pub use mock_transport::{MockPeer, MockTransport, Sent};
