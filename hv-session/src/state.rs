//! Shared session state
//!
//! Read-mostly state visible to collaborators outside the event loop: the
//! renderer, audio source threads and the CLI.

use hv_common::events::{EventBus, SessionEvent, SessionState};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Shared state accessible by all components
///
/// Only the runtime writes `session_state`; everything else reads it.
pub struct SharedState {
    /// Current session state, mirrored after every event-loop step
    pub session_state: RwLock<SessionState>,

    /// Open while recording; capture sources skip work while closed
    pub capture_gate: Arc<AtomicBool>,

    /// Event bus for renderer collaborators
    pub events: EventBus,

    /// Capture blocks dropped because the event loop was saturated
    pub capture_overflows: AtomicU64,
}

impl SharedState {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            session_state: RwLock::new(SessionState::Idle),
            capture_gate: Arc::new(AtomicBool::new(false)),
            events: EventBus::new(event_capacity),
            capture_overflows: AtomicU64::new(0),
        }
    }

    /// Subscribe to session events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn get_session_state(&self) -> SessionState {
        *self.session_state.read().await
    }

    pub async fn set_session_state(&self, state: SessionState) {
        *self.session_state.write().await = state;
    }

    /// True while the capture gate is open
    pub fn is_capturing(&self) -> bool {
        self.capture_gate.load(Ordering::Relaxed)
    }

    pub fn record_capture_overflow(&self) {
        self.capture_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn capture_overflow_count(&self) -> u64 {
        self.capture_overflows.load(Ordering::Relaxed)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(256)
    }
}
