//! In-memory transport
//!
//! `MockTransport` goes to the runtime; `MockPeer` stays with the test and
//! plays the server: it injects transport events and inspects what the
//! runtime sent.

use async_trait::async_trait;
use bytes::Bytes;
use hv_common::protocol::ClientMessage;
use hv_session::session::InboundFrame;
use hv_session::transport::{Transport, TransportEvent};
use hv_session::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// One frame the runtime put on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Binary(Bytes),
    Message(ClientMessage),
}

pub struct MockTransport {
    sent: Arc<Mutex<Vec<Sent>>>,
    connected: Arc<AtomicBool>,
}

/// Server side of a mock connection
pub struct MockPeer {
    events: mpsc::Sender<TransportEvent>,
    sent: Arc<Mutex<Vec<Sent>>>,
    connected: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn pair() -> (MockTransport, mpsc::Receiver<TransportEvent>, MockPeer) {
        let (tx, rx) = mpsc::channel(64);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let transport = MockTransport {
            sent: Arc::clone(&sent),
            connected: Arc::clone(&connected),
        };
        let peer = MockPeer {
            events: tx,
            sent,
            connected,
        };

        (transport, rx, peer)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_binary(&mut self, payload: Bytes) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock transport closed".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Binary(payload));
        Ok(())
    }

    async fn send_message(&mut self, message: &ClientMessage) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock transport closed".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Message(message.clone()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl MockPeer {
    pub async fn connect(&self) {
        self.events.send(TransportEvent::Connected).await.unwrap();
    }

    pub async fn send_text(&self, json: &str) {
        self.events
            .send(TransportEvent::Frame(InboundFrame::Text(json.to_string())))
            .await
            .unwrap();
    }

    pub async fn send_audio(&self, payload: Vec<u8>) {
        self.events
            .send(TransportEvent::Frame(InboundFrame::Binary(Bytes::from(payload))))
            .await
            .unwrap();
    }

    pub async fn disconnect(&self) {
        let _ = self.events.send(TransportEvent::Disconnected).await;
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_binaries(&self) -> Vec<Bytes> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Binary(b) => Some(b),
                Sent::Message(_) => None,
            })
            .collect()
    }

    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message(m) => Some(m),
                Sent::Binary(_) => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        !self.connected.load(Ordering::SeqCst)
    }

    /// Poll until `pred` holds for the sent log, or panic after `timeout`
    pub async fn wait_for_sent(&self, timeout: Duration, pred: impl Fn(&[Sent]) -> bool) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if pred(&self.sent()) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for sent frames: {:?}", self.sent());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
