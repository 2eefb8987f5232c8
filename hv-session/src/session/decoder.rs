//! Frame decoder
//!
//! Turns raw socket frames into typed events. Binary frames are always
//! audio; text frames are JSON tagged by `type`. Anything that cannot be
//! understood is logged and dropped, never surfaced as an error.

use crate::audio::types::AudioChunk;
use bytes::Bytes;
use hv_common::protocol::{
    decode_audio_payload, parse_server_message, LogLevel, ParseFailure, ServerMessage,
};
use tracing::{debug, warn};

/// One frame as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Binary(Bytes),
    Text(String),
}

/// Control events consumed by the session state machine
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    AssistantSpeaking,
    AssistantSilent,
    Thinking(bool),
    Transcript { speaker: String, text: String },
    Error(String),
    Log { message: String, level: LogLevel },
    SessionStarted,
    /// Peer abandoned its current turn
    Interrupted,
}

/// Typed result of decoding one frame
#[derive(Debug, Clone)]
pub enum DecodedFrame {
    Audio(AudioChunk),
    Control(ControlEvent),
}

/// Stateless apart from the chunk sequence counter and drop counters
#[derive(Debug, Default)]
pub struct FrameDecoder {
    next_sequence: u64,
    malformed: u64,
    unknown: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one frame; `None` means it was dropped
    pub fn decode(&mut self, frame: InboundFrame) -> Option<DecodedFrame> {
        match frame {
            InboundFrame::Binary(payload) => Some(DecodedFrame::Audio(self.chunk(payload))),
            InboundFrame::Text(text) => self.decode_text(&text),
        }
    }

    fn decode_text(&mut self, text: &str) -> Option<DecodedFrame> {
        let message = match parse_server_message(text) {
            Ok(message) => message,
            Err(ParseFailure::UnknownTag(tag)) => {
                self.unknown += 1;
                debug!("Ignoring message with unknown type '{}'", tag);
                return None;
            }
            Err(failure) => {
                self.malformed += 1;
                warn!("Dropping inbound text frame: {}", failure);
                return None;
            }
        };

        let event = match message {
            ServerMessage::Audio { data } => {
                return match decode_audio_payload(&data) {
                    Ok(bytes) => Some(DecodedFrame::Audio(self.chunk(Bytes::from(bytes)))),
                    Err(e) => {
                        self.malformed += 1;
                        warn!("Dropping audio message: {}", e);
                        None
                    }
                };
            }
            ServerMessage::Transcript { speaker, text } => ControlEvent::Transcript { speaker, text },
            ServerMessage::AssistantSpeaking => ControlEvent::AssistantSpeaking,
            ServerMessage::AssistantSilent => ControlEvent::AssistantSilent,
            ServerMessage::Thinking { active } => ControlEvent::Thinking(active),
            ServerMessage::Error { message } => ControlEvent::Error(message),
            ServerMessage::ServerLog { message, level } => ControlEvent::Log { message, level },
            ServerMessage::SessionStarted => ControlEvent::SessionStarted,
            ServerMessage::Interrupted => ControlEvent::Interrupted,
        };

        Some(DecodedFrame::Control(event))
    }

    fn chunk(&mut self, payload: Bytes) -> AudioChunk {
        let chunk = AudioChunk::new(self.next_sequence, payload);
        self.next_sequence += 1;
        chunk
    }

    /// Frames that failed to parse
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Well-formed messages with an unrecognized tag
    pub fn unknown_count(&self) -> u64 {
        self.unknown
    }
}
