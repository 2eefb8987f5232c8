//! Wire protocol between the voice client and the session server
//!
//! Two payload kinds travel over the socket:
//! - Binary frames carry raw audio (microphone PCM outbound, audio inbound)
//! - Text frames carry JSON objects tagged by a `type` field
//!
//! Inbound text is parsed in two steps so callers can tell a malformed
//! payload from a well-formed message with a tag this client does not know.
//! Both are dropped by the frame decoder, but they are logged differently.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Severity attached to `server_log` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Structured messages sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Base64-encoded audio (WAV container or raw PCM)
    Audio { data: String },

    /// Transcript line for either party
    Transcript { speaker: String, text: String },

    /// Assistant started an utterance
    AssistantSpeaking,

    /// Assistant finished its turn (audio may still be draining locally)
    AssistantSilent,

    /// Model reasoning indicator
    Thinking {
        #[serde(alias = "thinking", alias = "value")]
        active: bool,
    },

    /// Error reported by the server
    Error { message: String },

    /// Diagnostic log line forwarded by the server
    ServerLog {
        message: String,
        #[serde(default)]
        level: LogLevel,
    },

    /// Server accepted the socket and started the upstream session
    SessionStarted,

    /// Upstream model abandoned its current turn
    Interrupted,
}

impl ServerMessage {
    /// Every `type` tag this client understands
    pub const KNOWN_TAGS: &'static [&'static str] = &[
        "audio",
        "transcript",
        "assistant_speaking",
        "assistant_silent",
        "thinking",
        "error",
        "server_log",
        "session_started",
        "interrupted",
    ];
}

/// Why an inbound text payload could not become a [`ServerMessage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// Not JSON, not an object, no string `type`, or fields missing
    Malformed(String),

    /// Well-formed object whose tag is not recognized
    UnknownTag(String),
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::Malformed(reason) => write!(f, "malformed message: {}", reason),
            ParseFailure::UnknownTag(tag) => write!(f, "unknown message type '{}'", tag),
        }
    }
}

/// Parse one inbound text payload
pub fn parse_server_message(text: &str) -> std::result::Result<ServerMessage, ParseFailure> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ParseFailure::Malformed(e.to_string()))?;

    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ParseFailure::Malformed("missing string 'type' field".to_string()))?;

    if !ServerMessage::KNOWN_TAGS.contains(&tag) {
        return Err(ParseFailure::UnknownTag(tag.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ParseFailure::Malformed(e.to_string()))
}

/// Decode the base64 `data` field of an `audio` message
pub fn decode_audio_payload(data: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(data.trim())
        .map_err(|e| Error::Protocol(format!("invalid base64 audio payload: {}", e)))
}

/// Encode bytes for an `audio` message (used by tests and tooling)
pub fn encode_audio_payload(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Structured messages sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartSession,
    EndSession,
    ShareContent { content: serde_json::Value },
}

impl ClientMessage {
    /// Serialize to the JSON text sent over the socket
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(
            parse_server_message(r#"{"type":"assistant_speaking"}"#),
            Ok(ServerMessage::AssistantSpeaking)
        );
        assert_eq!(
            parse_server_message(r#"{"type":"thinking","active":true}"#),
            Ok(ServerMessage::Thinking { active: true })
        );
        assert_eq!(
            parse_server_message(r#"{"type":"thinking","thinking":false}"#),
            Ok(ServerMessage::Thinking { active: false })
        );
        assert_eq!(
            parse_server_message(r#"{"type":"transcript","text":"hi","speaker":"assistant"}"#),
            Ok(ServerMessage::Transcript {
                speaker: "assistant".to_string(),
                text: "hi".to_string()
            })
        );
    }

    #[test]
    fn test_server_log_level_defaults_to_info() {
        let msg = parse_server_message(r#"{"type":"server_log","message":"hello"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::ServerLog {
                message: "hello".to_string(),
                level: LogLevel::Info
            }
        );

        let msg =
            parse_server_message(r#"{"type":"server_log","message":"x","level":"warning"}"#)
                .unwrap();
        assert!(matches!(msg, ServerMessage::ServerLog { level: LogLevel::Warn, .. }));
    }

    #[test]
    fn test_unknown_tag_is_distinguished() {
        assert_eq!(
            parse_server_message(r#"{"type":"mystery","x":1}"#),
            Err(ParseFailure::UnknownTag("mystery".to_string()))
        );
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            parse_server_message("not json"),
            Err(ParseFailure::Malformed(_))
        ));
        assert!(matches!(
            parse_server_message(r#"{"no_type":true}"#),
            Err(ParseFailure::Malformed(_))
        ));
        assert!(matches!(
            parse_server_message(r#"[1,2,3]"#),
            Err(ParseFailure::Malformed(_))
        ));
        // Known tag, missing required field
        assert!(matches!(
            parse_server_message(r#"{"type":"error"}"#),
            Err(ParseFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_audio_payload_base64() {
        let bytes = decode_audio_payload(&encode_audio_payload(&[1, 2, 3, 250])).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 250]);
        assert!(decode_audio_payload("***").is_err());
    }

    #[test]
    fn test_client_messages_serialize_with_type_tag() {
        assert_eq!(
            ClientMessage::StartSession.to_json().unwrap(),
            r#"{"type":"start_session"}"#
        );
        let share = ClientMessage::ShareContent {
            content: serde_json::json!({"title": "notes"}),
        };
        let json: serde_json::Value =
            serde_json::from_str(&share.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "share_content");
        assert_eq!(json["content"]["title"], "notes");
    }
}
