//! Session runtime: the single event loop
//!
//! One tokio task owns the [`SessionCore`] and the transport's send half.
//! Everything that can change session state arrives here and is handled one
//! event at a time, in arrival order:
//! - Transport events (frames, connect, disconnect)
//! - Local input from [`SessionHandle`] (push-to-talk, capture blocks,
//!   outbound messages)
//! - Completions of work the loop started (off-thread decodes, timers)
//!
//! After each event the loop runs the core's queued tasks and flushes its
//! outbox to the socket, so frames leave in the order the core produced them.

use super::core::{Outbound, SessionCore, Task};
use super::machine::Input;
use crate::error::{Error, Result};
use crate::playback::graph::OutputGraph;
use crate::playback::scheduler::DecodeOutcome;
use crate::state::SharedState;
use crate::transport::{Transport, TransportEvent};
use hv_common::config::SessionConfig;
use hv_common::events::SessionState;
use hv_common::protocol::ClientMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Capacity of the runtime input channel
const RUNTIME_CHANNEL_CAPACITY: usize = 512;

/// How often the live output level is published
const LEVEL_INTERVAL: Duration = Duration::from_millis(50);

/// Inputs to the event loop
#[derive(Debug)]
pub enum RuntimeEvent {
    KeyDown,
    KeyUp,
    Capture { samples: Vec<f32>, sample_rate: u32 },
    Send(ClientMessage),
    Decoded(DecodeOutcome),
    SettleTick,
    SettleTimeout(u64),
    LingerElapsed(u64),
    CapabilityFailed(String),
    CapabilityRestored,
    Shutdown,
}

/// Cloneable handle for driving a running session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<RuntimeEvent>,
    shared: Arc<SharedState>,
}

impl SessionHandle {
    async fn send(&self, event: RuntimeEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::InvalidState("session runtime has stopped".to_string()))
    }

    /// Push-to-talk pressed
    pub async fn key_down(&self) -> Result<()> {
        self.send(RuntimeEvent::KeyDown).await
    }

    /// Push-to-talk released
    pub async fn key_up(&self) -> Result<()> {
        self.send(RuntimeEvent::KeyUp).await
    }

    /// Inject shared content into the conversation
    pub async fn share_content(&self, content: serde_json::Value) -> Result<()> {
        self.send(RuntimeEvent::Send(ClientMessage::ShareContent { content }))
            .await
    }

    /// Ask the server to end the upstream session
    pub async fn end_session(&self) -> Result<()> {
        self.send(RuntimeEvent::Send(ClientMessage::EndSession)).await
    }

    pub async fn capability_failed(&self, reason: impl Into<String>) -> Result<()> {
        self.send(RuntimeEvent::CapabilityFailed(reason.into())).await
    }

    pub async fn capability_restored(&self) -> Result<()> {
        self.send(RuntimeEvent::CapabilityRestored).await
    }

    /// Stop the event loop and close the transport
    pub async fn shutdown(&self) -> Result<()> {
        self.send(RuntimeEvent::Shutdown).await
    }

    /// Hand a captured block to the loop without blocking
    ///
    /// Callable from audio threads. Returns false if the block was skipped
    /// (gate closed) or dropped (loop saturated).
    pub fn capture_frame(&self, samples: Vec<f32>, sample_rate: u32) -> bool {
        if !self.shared.is_capturing() {
            return false;
        }
        match self.tx.try_send(RuntimeEvent::Capture {
            samples,
            sample_rate,
        }) {
            Ok(()) => true,
            Err(_) => {
                self.shared.record_capture_overflow();
                false
            }
        }
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }
}

/// Event loop owning one session
pub struct SessionRuntime<T: Transport> {
    core: SessionCore,
    transport: T,
    transport_rx: mpsc::Receiver<TransportEvent>,
    transport_open: bool,
    rx: mpsc::Receiver<RuntimeEvent>,
    tx: mpsc::Sender<RuntimeEvent>,
    shared: Arc<SharedState>,
    config: SessionConfig,
    settle_task: Option<JoinHandle<()>>,
    settle_token: u64,
    linger_task: Option<JoinHandle<()>>,
    linger_token: u64,
}

impl<T: Transport> SessionRuntime<T> {
    /// Build the runtime and its handle
    ///
    /// `graph` must be the graph the output sink renders.
    pub fn new(
        config: SessionConfig,
        graph: OutputGraph,
        shared: Arc<SharedState>,
        transport: T,
        transport_rx: mpsc::Receiver<TransportEvent>,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(RUNTIME_CHANNEL_CAPACITY);
        let core = SessionCore::new(
            &config,
            graph,
            shared.events.clone(),
            Arc::clone(&shared.capture_gate),
        );

        let handle = SessionHandle {
            tx: tx.clone(),
            shared: Arc::clone(&shared),
        };

        let runtime = Self {
            core,
            transport,
            transport_rx,
            transport_open: true,
            rx,
            tx,
            shared,
            config,
            settle_task: None,
            settle_token: 0,
            linger_task: None,
            linger_token: 0,
        };

        (runtime, handle)
    }

    /// Run until shutdown or until the transport goes away
    ///
    /// Returns the final session state.
    pub async fn run(mut self) -> Result<SessionState> {
        info!("Session runtime started");

        let mut level_tick = tokio::time::interval(LEVEL_INTERVAL);
        level_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = self.transport_rx.recv(), if self.transport_open => {
                    self.on_transport_event(event);
                }
                event = self.rx.recv() => match event {
                    Some(RuntimeEvent::Shutdown) | None => break,
                    Some(event) => self.on_runtime_event(event),
                },
                _ = level_tick.tick() => self.core.publish_level(),
            }

            self.pump().await;
            self.shared.set_session_state(self.core.state()).await;

            if !self.transport_open {
                info!("Transport closed, leaving session loop");
                break;
            }
        }

        self.shutdown().await;
        Ok(self.core.state())
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Connected) => {
                self.core.on_input(Input::TransportConnected);
                self.core.send_message(ClientMessage::StartSession);
            }
            Some(TransportEvent::Frame(frame)) => self.core.on_frame(frame),
            Some(TransportEvent::Error(reason)) => {
                self.transport_open = false;
                self.core.on_input(Input::TransportError(reason));
            }
            Some(TransportEvent::Disconnected) | None => {
                self.transport_open = false;
                self.core.on_input(Input::TransportDisconnected);
            }
        }
    }

    fn on_runtime_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::KeyDown => {
                self.core.on_input(Input::KeyDown);
            }
            RuntimeEvent::KeyUp => {
                self.core.on_input(Input::KeyUp);
            }
            RuntimeEvent::Capture {
                samples,
                sample_rate,
            } => self.core.on_capture(&samples, sample_rate),
            RuntimeEvent::Send(message) => self.core.send_message(message),
            RuntimeEvent::Decoded(outcome) => {
                self.core.on_decoded(outcome);
            }
            RuntimeEvent::SettleTick => {
                self.core.poll_settle();
            }
            RuntimeEvent::SettleTimeout(token) if token == self.settle_token => {
                self.core.force_settle();
            }
            RuntimeEvent::LingerElapsed(token) if token == self.linger_token => {
                self.core.on_input(Input::ThinkingLingerElapsed);
            }
            RuntimeEvent::SettleTimeout(_) | RuntimeEvent::LingerElapsed(_) => {
                debug!("Ignoring stale timer event");
            }
            RuntimeEvent::CapabilityFailed(reason) => {
                self.core.on_input(Input::CapabilityFailed(reason));
            }
            RuntimeEvent::CapabilityRestored => {
                self.core.on_input(Input::CapabilityRestored);
            }
            RuntimeEvent::Shutdown => {}
        }
    }

    /// Run queued tasks and flush the outbox until both are empty
    async fn pump(&mut self) {
        loop {
            let tasks = self.core.take_tasks();
            let outbound = self.core.take_outbound();
            if tasks.is_empty() && outbound.is_empty() {
                break;
            }

            for task in tasks {
                self.run_task(task);
            }

            for frame in outbound {
                if !self.transport_open {
                    debug!("Transport closed, dropping outbound frame");
                    continue;
                }
                if let Err(e) = self.send(frame).await {
                    error!("Send failed: {}", e);
                    self.transport_open = false;
                    self.core.on_input(Input::TransportError(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, frame: Outbound) -> Result<()> {
        match frame {
            Outbound::Binary(payload) => self.transport.send_binary(payload).await,
            Outbound::Message(message) => self.transport.send_message(&message).await,
        }
    }

    fn run_task(&mut self, task: Task) {
        match task {
            Task::Decode(job) => {
                let tx = self.tx.clone();
                tokio::task::spawn_blocking(move || {
                    let outcome = job.run();
                    let _ = tx.blocking_send(RuntimeEvent::Decoded(outcome));
                });
            }
            Task::StartSettleWatch => {
                self.cancel_settle_watch();
                self.settle_token += 1;
                self.settle_task = Some(tokio::spawn(settle_watch(
                    self.tx.clone(),
                    self.config.settle_poll_interval(),
                    self.config.settle_timeout(),
                    self.settle_token,
                )));
            }
            Task::CancelSettleWatch => self.cancel_settle_watch(),
            Task::StartThinkingLinger => {
                self.cancel_thinking_linger();
                self.linger_token += 1;
                let tx = self.tx.clone();
                let token = self.linger_token;
                let linger = self.config.thinking_linger();
                self.linger_task = Some(tokio::spawn(async move {
                    tokio::time::sleep(linger).await;
                    let _ = tx.send(RuntimeEvent::LingerElapsed(token)).await;
                }));
            }
            Task::CancelThinkingLinger => self.cancel_thinking_linger(),
        }
    }

    fn cancel_settle_watch(&mut self) {
        if let Some(task) = self.settle_task.take() {
            task.abort();
            self.settle_token += 1;
        }
    }

    fn cancel_thinking_linger(&mut self) {
        if let Some(task) = self.linger_task.take() {
            task.abort();
            self.linger_token += 1;
        }
    }

    async fn shutdown(&mut self) {
        self.cancel_settle_watch();
        self.cancel_thinking_linger();

        if self.transport_open {
            self.transport_open = false;
            if let Err(e) = self.transport.close().await {
                warn!("Error closing transport: {}", e);
            }
            self.core.on_input(Input::TransportDisconnected);
        }

        // Drop anything the teardown queued; the socket is gone
        self.core.take_tasks();
        self.core.take_outbound();
        self.shared.set_session_state(self.core.state()).await;

        info!("Session runtime stopped in state {}", self.core.state());
    }
}

/// Poll for drained playback until cancelled or out of time
async fn settle_watch(
    tx: mpsc::Sender<RuntimeEvent>,
    poll: Duration,
    timeout: Duration,
    token: u64,
) {
    let deadline = Instant::now() + timeout;
    let mut interval = tokio::time::interval(poll);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if Instant::now() >= deadline {
            let _ = tx.send(RuntimeEvent::SettleTimeout(token)).await;
            return;
        }
        if tx.send(RuntimeEvent::SettleTick).await.is_err() {
            return;
        }
    }
}
