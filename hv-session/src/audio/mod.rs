//! Audio plumbing: payload decoding, resampling, PCM conversion, sinks and
//! capture sources

pub mod decode;
#[cfg(feature = "device")]
pub mod device;
pub mod input;
pub mod output;
pub mod pcm;
pub mod resampler;
pub mod types;

pub use input::WavCaptureSource;
pub use output::{PacedSink, SinkTarget};
pub use types::{AudioChunk, PcmBuffer};
