//! Socket transport to the session server
//!
//! The transport is a dumb pipe: binary frames and JSON text out, raw frames
//! in. Inbound traffic and connection changes arrive as [`TransportEvent`]s
//! on a channel, in the order the socket delivered them. Reconnecting is the
//! owner's job, not the transport's.

pub mod websocket;

use crate::error::Result;
use crate::session::decoder::InboundFrame;
use async_trait::async_trait;
use bytes::Bytes;
use hv_common::protocol::ClientMessage;

pub use websocket::WebSocketTransport;

/// Connection lifecycle and inbound traffic
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Frame(InboundFrame),
    /// Closed cleanly by either side
    Disconnected,
    /// Closed by a socket error
    Error(String),
}

/// Outbound half of an active connection
#[async_trait]
pub trait Transport: Send {
    /// Send one binary frame (microphone PCM or silence)
    async fn send_binary(&mut self, payload: Bytes) -> Result<()>;

    /// Send one JSON control message
    async fn send_message(&mut self, message: &ClientMessage) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Close the connection; closing twice is not an error
    async fn close(&mut self) -> Result<()>;
}
