//! Session state types shared with renderer collaborators

use serde::{Deserialize, Serialize};

/// Conversational state of the single active session
///
/// Exactly one value is active at a time. Transitions are owned by the
/// session state machine in `hv-session`; everything else only reads it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport yet
    #[default]
    Idle,
    /// Transport up, upstream session not confirmed
    Connected,
    /// Push-to-talk held, microphone frames forwarded
    Recording,
    /// Waiting for the assistant
    Listening,
    /// Assistant audio is playing
    Speaking,
    /// Assistant is reasoning
    Thinking,
    /// Assistant turn was cut short by the peer
    Interrupted,
    /// Capability or transport failure
    Error,
    /// Transport closed; recovery belongs to the connection owner
    Disconnected,
}

impl SessionState {
    /// True while a transport is believed to be up
    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Disconnected)
    }

    /// True while assistant output may be audible or imminent
    pub fn is_assistant_turn(&self) -> bool {
        matches!(self, SessionState::Speaking | SessionState::Thinking)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connected => "connected",
            SessionState::Recording => "recording",
            SessionState::Listening => "listening",
            SessionState::Speaking => "speaking",
            SessionState::Thinking => "thinking",
            SessionState::Interrupted => "interrupted",
            SessionState::Error => "error",
            SessionState::Disconnected => "disconnected",
        };
        write!(f, "{}", name)
    }
}
