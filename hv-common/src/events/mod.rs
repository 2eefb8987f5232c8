//! Session events and the broadcast bus that carries them
//!
//! The coordinator publishes what happened; renderers, loggers and tests
//! subscribe. Nothing on the bus feeds back into session state.

mod session_types;

pub use session_types::SessionState;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::protocol::LogLevel;

/// Events published by the session coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Session state changed
    StateChanged {
        old_state: SessionState,
        new_state: SessionState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Live output level from the playback meter (RMS, 0.0-1.0)
    ///
    /// Published once per rendered block while the meter is attached.
    AudioLevel { level: f32 },

    /// Transcript line received from the server
    Transcript {
        speaker: String,
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Thinking indicator switched on or off
    ThinkingIndicator { active: bool },

    /// An inbound payload was dropped instead of played
    ChunkDropped {
        /// Sequence index when the payload made it to an AudioChunk
        sequence: Option<u64>,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scheduled and pending playback was discarded
    PlaybackInterrupted {
        discarded_pending: usize,
        discarded_segments: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Turn-completion silence frame went out to the peer
    TurnCompleted {
        samples: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Log line forwarded by the server
    ServerLog { message: String, level: LogLevel },

    /// Error reported by the server or raised locally
    SessionError {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Central event distribution bus
///
/// Wraps a `tokio::sync::broadcast` channel:
/// - Publishing never blocks; slow subscribers see `Lagged`
/// - Subscribers only receive events emitted after they subscribe
///
/// # Examples
///
/// ```
/// use hv_common::events::{EventBus, SessionEvent, SessionState};
///
/// let bus = EventBus::new(64);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(SessionEvent::StateChanged {
///     old_state: SessionState::Idle,
///     new_state: SessionState::Connected,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(SessionEvent::StateChanged { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
