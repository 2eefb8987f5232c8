//! WebSocket transport using tokio-tungstenite

use super::{Transport, TransportEvent};
use crate::error::{Error, Result};
use crate::session::decoder::InboundFrame;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use hv_common::protocol::ClientMessage;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

/// Capacity of the inbound event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Client side of a WebSocket connection
pub struct WebSocketTransport {
    sink: Option<WsSink>,
}

impl WebSocketTransport {
    /// Dial `url` and start the read pump
    ///
    /// `Connected` is the first event on the returned channel.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        info!("Connecting to {}", url);

        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| Error::Transport(format!("WebSocket connect to {} failed: {}", url, e)))?;

        let (sink, stream) = ws.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let _ = event_tx.send(TransportEvent::Connected).await;
        tokio::spawn(read_pump(stream, event_tx));

        Ok((Self { sink: Some(sink) }, event_rx))
    }

    fn sink(&mut self) -> Result<&mut WsSink> {
        self.sink
            .as_mut()
            .ok_or_else(|| Error::Transport("socket is closed".to_string()))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_binary(&mut self, payload: Bytes) -> Result<()> {
        debug!("--> binary frame, {} bytes", payload.len());
        self.sink()?
            .send(Message::Binary(payload))
            .await
            .map_err(|e| Error::Transport(format!("send failed: {}", e)))
    }

    async fn send_message(&mut self, message: &ClientMessage) -> Result<()> {
        let text = message.to_json()?;
        debug!("--> {}", text);
        self.sink()?
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::Transport(format!("send failed: {}", e)))
    }

    fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            info!("Closing WebSocket");
            sink.close()
                .await
                .map_err(|e| Error::Transport(format!("close failed: {}", e)))?;
        }
        Ok(())
    }
}

async fn read_pump(mut stream: WsStream, event_tx: mpsc::Sender<TransportEvent>) {
    let final_event = loop {
        let frame = match stream.next().await {
            Some(Ok(Message::Binary(data))) => InboundFrame::Binary(data),
            Some(Ok(Message::Text(text))) => InboundFrame::Text(text.as_str().to_string()),
            Some(Ok(Message::Close(frame))) => {
                info!("Server closed the socket: {:?}", frame);
                break TransportEvent::Disconnected;
            }
            // Ping/pong are answered by tungstenite
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!("WebSocket read error: {}", e);
                break TransportEvent::Error(e.to_string());
            }
            None => break TransportEvent::Disconnected,
        };

        if event_tx.send(TransportEvent::Frame(frame)).await.is_err() {
            warn!("Event receiver dropped, stopping read pump");
            return;
        }
    };

    let _ = event_tx.send(final_event).await;
}
