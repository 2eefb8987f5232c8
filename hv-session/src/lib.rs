//! # Her Voice Session Library (hv-session)
//!
//! Client-side coordinator for a push-to-talk voice session with a remote
//! conversational audio model.
//!
//! **Purpose:** Multiplex inbound audio and control frames, schedule audio
//! onto a crossfaded output timeline, track the conversational state, and
//! cut the assistant off cleanly when the user starts talking.
//!
//! **Architecture:** One tokio event loop owns all session state; decoding
//! runs on the blocking pool; output is rendered from a shared graph by a
//! sound card callback or a paced render thread.

pub mod audio;
pub mod capture;
pub mod error;
pub mod playback;
pub mod session;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
pub use session::{SessionHandle, SessionRuntime};
pub use state::SharedState;

/// Build metadata captured by build.rs
pub mod build_info {
    pub const GIT_HASH: &str = env!("HV_GIT_HASH");
    pub const BUILD_TIMESTAMP: &str = env!("HV_BUILD_TIMESTAMP");
    pub const BUILD_PROFILE: &str = env!("HV_BUILD_PROFILE");
}
