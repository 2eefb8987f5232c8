//! Error types for hv-session
//!
//! None of these are fatal to the coordinator: decode errors drop one chunk,
//! capability errors move the session into `Error`, transport errors end the
//! session and leave recovery to the connection owner.

use thiserror::Error;

/// Main error type for the session coordinator
#[derive(Error, Debug)]
pub enum Error {
    /// Shared-crate errors (config, protocol)
    #[error(transparent)]
    Common(#[from] hv_common::Error),

    /// Audio payload could not be decoded or resampled
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// WAV container errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Microphone / capture source errors
    #[error("Audio input error: {0}")]
    AudioInput(String),

    /// Socket errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience Result type using hv-session Error
pub type Result<T> = std::result::Result<T, Error>;
