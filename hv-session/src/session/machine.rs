//! Session state machine
//!
//! A pure transition function: `(state, input) -> (new state, effects)`.
//! It never touches audio, sockets or timers itself; the session core runs
//! the returned effects in order. Any input not handled in the current state
//! is a no-op that leaves the state and flags untouched.
//!
//! Not every server announces `assistant_speaking`; the first audio chunk
//! accepted outside a turn starts one just the same.
//!
//! Two waits are modelled as flags rather than states:
//! - `awaiting_settle`: assistant said it is silent, local playback still
//!   draining. The state stays `Speaking` until `Settled` arrives.
//! - `thinking_resolving`: reasoning ended, indicator lingers briefly. The
//!   state stays `Thinking` until speech starts, silence is announced or the
//!   linger timer fires.

use super::decoder::ControlEvent;
use hv_common::events::SessionState;
use tracing::{debug, info};

/// Everything that can drive a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    TransportConnected,
    TransportDisconnected,
    TransportError(String),
    Control(ControlEvent),
    /// An assistant audio chunk was accepted for playback
    AudioArrived,
    /// Push-to-talk pressed
    KeyDown,
    /// Push-to-talk released
    KeyUp,
    /// Settle watch observed drained playback
    Settled,
    ThinkingLingerElapsed,
    /// Microphone or output device became unusable
    CapabilityFailed(String),
    CapabilityRestored,
}

/// Side effects requested by a transition, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ArmCapture,
    StartCapture,
    StopCapture,
    MarkSchedulerActive,
    MarkSchedulerInactive,
    EndUtterance,
    StartSettleWatch,
    CancelSettleWatch,
    ShowThinking,
    HideThinkingAfterLinger,
    CancelThinkingLinger,
    HideThinking,
    /// Run the interrupt controller (flush and send the silence frame)
    Interrupt,
    /// Flush playback without signalling the peer
    FlushPlayback,
    /// Send the turn-completion silence frame
    SendTurnComplete,
    /// Discard all playback state; the session is gone
    Teardown,
}

/// Outcome of one input
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    /// Intermediate state passed through, if any
    pub via: Option<SessionState>,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: SessionState) -> Self {
        Self {
            from: state,
            to: state,
            via: None,
            effects: Vec::new(),
        }
    }

    /// True if the state value changed
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// True if nothing happened at all
    pub fn is_noop(&self) -> bool {
        !self.changed() && self.via.is_none() && self.effects.is_empty()
    }
}

/// Why the session is in `Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Capability,
}

/// Conversational state plus the two pending-wait flags
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
    error_kind: Option<ErrorKind>,
    awaiting_settle: bool,
    thinking_resolving: bool,
    indicator_shown: bool,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn awaiting_settle(&self) -> bool {
        self.awaiting_settle
    }

    pub fn thinking_indicator(&self) -> bool {
        self.indicator_shown
    }

    /// Apply one input
    ///
    /// `audio_active` is whether the scheduler still has pending or audible
    /// audio; it decides whether push-to-talk has to interrupt first.
    pub fn apply(&mut self, input: &Input, audio_active: bool) -> Transition {
        let from = self.state;
        let mut effects = Vec::new();
        let mut via = None;

        use SessionState::*;
        let to = match (from, input) {
            (Idle | Disconnected, Input::TransportConnected) => {
                effects.push(Effect::ArmCapture);
                Connected
            }
            (Error, Input::TransportConnected) if self.error_kind == Some(ErrorKind::Transport) => {
                effects.push(Effect::ArmCapture);
                Connected
            }

            (Disconnected, Input::TransportDisconnected) => return Transition::unchanged(from),
            (_, Input::TransportDisconnected) => {
                self.shutdown_effects(&mut effects);
                Disconnected
            }

            (Error, Input::TransportError(_)) if self.error_kind == Some(ErrorKind::Transport) => {
                return Transition::unchanged(from)
            }
            (_, Input::TransportError(_)) => {
                self.shutdown_effects(&mut effects);
                self.error_kind = Some(ErrorKind::Transport);
                Error
            }

            (Connected, Input::Control(ControlEvent::SessionStarted)) => Listening,

            (
                Connected | Listening | Interrupted,
                Input::Control(ControlEvent::AssistantSpeaking) | Input::AudioArrived,
            ) => {
                effects.push(Effect::MarkSchedulerActive);
                Speaking
            }
            (Speaking, Input::Control(ControlEvent::AssistantSpeaking)) if self.awaiting_settle => {
                self.cancel_settle(&mut effects);
                Speaking
            }
            (Thinking, Input::Control(ControlEvent::AssistantSpeaking) | Input::AudioArrived) => {
                self.hide_thinking(&mut effects);
                effects.push(Effect::MarkSchedulerActive);
                Speaking
            }

            (Speaking, Input::Control(ControlEvent::AssistantSilent)) if !self.awaiting_settle => {
                self.awaiting_settle = true;
                effects.push(Effect::EndUtterance);
                effects.push(Effect::StartSettleWatch);
                Speaking
            }
            (Thinking, Input::Control(ControlEvent::AssistantSilent)) => {
                self.hide_thinking(&mut effects);
                effects.push(Effect::EndUtterance);
                effects.push(Effect::MarkSchedulerInactive);
                Listening
            }
            (Interrupted, Input::Control(ControlEvent::AssistantSilent)) => {
                effects.push(Effect::EndUtterance);
                effects.push(Effect::MarkSchedulerInactive);
                Listening
            }

            (Speaking, Input::Settled) if self.awaiting_settle => {
                self.awaiting_settle = false;
                effects.push(Effect::MarkSchedulerInactive);
                Listening
            }

            (Listening | Speaking, Input::Control(ControlEvent::Thinking(true))) => {
                self.cancel_settle(&mut effects);
                self.indicator_shown = true;
                effects.push(Effect::ShowThinking);
                Thinking
            }
            (Thinking, Input::Control(ControlEvent::Thinking(true))) if self.thinking_resolving => {
                self.thinking_resolving = false;
                effects.push(Effect::CancelThinkingLinger);
                Thinking
            }
            (Thinking, Input::Control(ControlEvent::Thinking(false))) if !self.thinking_resolving => {
                self.thinking_resolving = true;
                effects.push(Effect::HideThinkingAfterLinger);
                Thinking
            }
            (Thinking, Input::ThinkingLingerElapsed) if self.thinking_resolving => {
                self.thinking_resolving = false;
                self.indicator_shown = false;
                effects.push(Effect::HideThinking);
                Listening
            }

            (Speaking | Thinking, Input::Control(ControlEvent::Interrupted)) => {
                self.cancel_settle(&mut effects);
                self.hide_thinking(&mut effects);
                effects.push(Effect::FlushPlayback);
                Interrupted
            }

            (Connected | Listening | Speaking | Thinking | Interrupted, Input::KeyDown) => {
                if matches!(from, Speaking | Thinking) || audio_active {
                    self.cancel_settle(&mut effects);
                    self.hide_thinking(&mut effects);
                    effects.push(Effect::Interrupt);
                    effects.push(Effect::MarkSchedulerInactive);
                    if from != Interrupted {
                        via = Some(Interrupted);
                    }
                }
                effects.push(Effect::StartCapture);
                Recording
            }
            (Recording, Input::KeyUp) => {
                effects.push(Effect::StopCapture);
                effects.push(Effect::SendTurnComplete);
                Listening
            }

            (Connected | Listening | Speaking | Thinking | Interrupted | Recording,
             Input::CapabilityFailed(_)) => {
                effects.push(Effect::StopCapture);
                self.cancel_settle(&mut effects);
                self.hide_thinking(&mut effects);
                effects.push(Effect::MarkSchedulerInactive);
                self.error_kind = Some(ErrorKind::Capability);
                Error
            }
            (Error, Input::CapabilityRestored) if self.error_kind == Some(ErrorKind::Capability) => {
                Listening
            }

            _ => return Transition::unchanged(from),
        };

        if to != Error {
            self.error_kind = None;
        }
        self.state = to;

        let transition = Transition {
            from,
            to,
            via,
            effects,
        };

        if transition.changed() {
            match via {
                Some(mid) => info!("Session state: {} -> {} -> {}", from, mid, to),
                None => info!("Session state: {} -> {}", from, to),
            }
        } else {
            debug!("Session stays {} on {:?}", from, input);
        }

        transition
    }

    fn cancel_settle(&mut self, effects: &mut Vec<Effect>) {
        if self.awaiting_settle {
            self.awaiting_settle = false;
            effects.push(Effect::CancelSettleWatch);
        }
    }

    fn hide_thinking(&mut self, effects: &mut Vec<Effect>) {
        if self.thinking_resolving {
            effects.push(Effect::CancelThinkingLinger);
        }
        if self.indicator_shown {
            effects.push(Effect::HideThinking);
        }
        self.thinking_resolving = false;
        self.indicator_shown = false;
    }

    fn shutdown_effects(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::StopCapture);
        self.cancel_settle(effects);
        self.hide_thinking(effects);
        effects.push(Effect::Teardown);
    }
}
