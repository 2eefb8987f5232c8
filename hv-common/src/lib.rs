//! # Her Voice Common Library
//!
//! Shared code for the voice session workspace:
//! - Wire protocol types (server and client messages)
//! - Session state and event types (`SessionEvent`, `EventBus`)
//! - Configuration loading
//! - Fade curve definitions

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod protocol;

pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
