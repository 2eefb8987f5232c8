//! Session coordination
//!
//! - `decoder`: socket frames to typed events
//! - `machine`: conversational state and transition rules
//! - `interrupt`: push-to-talk barge-in
//! - `core`: synchronous owner of all of the above
//! - `runtime`: the tokio event loop driving the core

pub mod core;
pub mod decoder;
pub mod interrupt;
pub mod machine;
pub mod runtime;

pub use self::core::{Outbound, SessionCore, Task};
pub use decoder::{ControlEvent, DecodedFrame, FrameDecoder, InboundFrame};
pub use interrupt::{InterruptController, InterruptOutcome};
pub use machine::{Effect, ErrorKind, Input, SessionMachine, Transition};
pub use runtime::{RuntimeEvent, SessionHandle, SessionRuntime};
