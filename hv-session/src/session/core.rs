//! Session core
//!
//! Owns the frame decoder, state machine, scheduler, interrupt controller and
//! capture pipeline, and executes the machine's effects against them. It is
//! entirely synchronous: work that has to happen elsewhere (sending on the
//! socket, decoding off-thread, timers) is queued as [`Outbound`] frames and
//! [`Task`]s for the runtime to pick up after each step.

use super::decoder::{ControlEvent, DecodedFrame, FrameDecoder, InboundFrame};
use super::interrupt::InterruptController;
use super::machine::{Effect, Input, SessionMachine, Transition};
use crate::capture::CapturePipeline;
use crate::playback::graph::OutputGraph;
use crate::playback::scheduler::{
    DecodeJob, DecodeOutcome, DrainReport, InterruptReport, PlaybackScheduler,
};
use bytes::Bytes;
use chrono::Utc;
use hv_common::config::SessionConfig;
use hv_common::events::{EventBus, SessionEvent, SessionState};
use hv_common::protocol::{ClientMessage, LogLevel};
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Something to put on the socket
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Binary(Bytes),
    Message(ClientMessage),
}

/// Work the runtime performs outside the core
#[derive(Debug)]
pub enum Task {
    Decode(DecodeJob),
    StartSettleWatch,
    CancelSettleWatch,
    StartThinkingLinger,
    CancelThinkingLinger,
}

/// Synchronous heart of one session
pub struct SessionCore {
    machine: SessionMachine,
    scheduler: PlaybackScheduler,
    interrupt: InterruptController,
    capture: CapturePipeline,
    decoder: FrameDecoder,
    bus: EventBus,
    settle_grace: Duration,
    outbox: VecDeque<Outbound>,
    tasks: VecDeque<Task>,
}

impl SessionCore {
    pub fn new(
        config: &SessionConfig,
        graph: OutputGraph,
        bus: EventBus,
        capture_gate: Arc<AtomicBool>,
    ) -> Self {
        let scheduler = PlaybackScheduler::new(graph, config.fade_window())
            .with_fallback_rate(config.output_sample_rate);

        Self {
            machine: SessionMachine::new(),
            scheduler,
            interrupt: InterruptController::new(config.silence_frame_samples()),
            capture: CapturePipeline::new(config.input_sample_rate, capture_gate),
            decoder: FrameDecoder::new(),
            bus,
            settle_grace: config.settle_grace(),
            outbox: VecDeque::new(),
            tasks: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn capture(&self) -> &CapturePipeline {
        &self.capture
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    pub fn interrupt_controller(&self) -> &InterruptController {
        &self.interrupt
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Handle one inbound socket frame
    pub fn on_frame(&mut self, frame: InboundFrame) {
        let malformed_before = self.decoder.malformed_count();

        match self.decoder.decode(frame) {
            Some(DecodedFrame::Audio(chunk)) => {
                if self.state() == SessionState::Recording {
                    debug!("Dropping chunk #{} while recording", chunk.sequence);
                    self.publish_drop(Some(chunk.sequence), "arrived while recording");
                    return;
                }
                self.on_input(Input::AudioArrived);
                let job = self.scheduler.push(chunk);
                self.tasks.push_back(Task::Decode(job));
            }
            Some(DecodedFrame::Control(event)) => {
                self.publish_control(&event);
                self.on_input(Input::Control(event));
            }
            None => {
                if self.decoder.malformed_count() > malformed_before {
                    self.publish_drop(None, "malformed frame");
                }
            }
        }
    }

    /// Apply one input to the machine and run the resulting effects
    pub fn on_input(&mut self, input: Input) -> Transition {
        if let Input::TransportError(reason) | Input::CapabilityFailed(reason) = &input {
            error!("Session failure: {}", reason);
            self.bus.emit_lossy(SessionEvent::SessionError {
                message: reason.clone(),
                timestamp: Utc::now(),
            });
        }

        let transition = self.machine.apply(&input, self.scheduler.has_audio());
        self.publish_transition(&transition);

        for effect in &transition.effects {
            self.run_effect(*effect);
        }

        transition
    }

    /// Hand a finished decode back to the scheduler
    pub fn on_decoded(&mut self, outcome: DecodeOutcome) -> DrainReport {
        let report = self.scheduler.complete_decode(outcome);
        for dropped in &report.dropped {
            self.publish_drop(Some(dropped.sequence), &dropped.reason);
        }
        report
    }

    /// Decode and schedule every queued decode job inline
    ///
    /// Used where there is no blocking pool to hand jobs to.
    pub fn run_pending_decodes(&mut self) {
        let jobs: Vec<DecodeJob> = self
            .take_tasks_where(|task| matches!(task, Task::Decode(_)))
            .into_iter()
            .filter_map(|task| match task {
                Task::Decode(job) => Some(job),
                _ => None,
            })
            .collect();

        for job in jobs {
            self.on_decoded(job.run());
        }
    }

    /// Handle one captured microphone block
    pub fn on_capture(&mut self, samples: &[f32], sample_rate: u32) {
        if let Some(frame) = self.capture.process(samples, sample_rate) {
            self.outbox.push_back(Outbound::Binary(frame));
        }
    }

    /// Queue a control message for the peer
    pub fn send_message(&mut self, message: ClientMessage) {
        self.outbox.push_back(Outbound::Message(message));
    }

    /// Settle watch tick; returns true if the session settled
    pub fn poll_settle(&mut self) -> bool {
        if !self.machine.awaiting_settle() || !self.scheduler.is_settled(self.settle_grace) {
            return false;
        }
        self.tasks.push_back(Task::CancelSettleWatch);
        self.on_input(Input::Settled);
        true
    }

    /// Settle watch ran out of time; treat playback as drained
    pub fn force_settle(&mut self) {
        if self.machine.awaiting_settle() {
            warn!("Playback did not settle in time, forcing end of turn");
            self.tasks.push_back(Task::CancelSettleWatch);
            self.on_input(Input::Settled);
        }
    }

    /// Publish the live output level while the meter is attached
    pub fn publish_level(&self) {
        let graph = self.scheduler.graph();
        if graph.meter_attached() {
            self.bus.emit_lossy(SessionEvent::AudioLevel {
                level: graph.level(),
            });
        }
    }

    /// Drain frames waiting to go out on the socket
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        self.outbox.drain(..).collect()
    }

    /// Drain work waiting for the runtime
    pub fn take_tasks(&mut self) -> Vec<Task> {
        self.tasks.drain(..).collect()
    }

    fn take_tasks_where(&mut self, pred: impl Fn(&Task) -> bool) -> Vec<Task> {
        let (taken, kept): (VecDeque<Task>, VecDeque<Task>) =
            self.tasks.drain(..).partition(|task| pred(task));
        self.tasks = kept;
        taken.into()
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::ArmCapture => self.capture.arm(),
            Effect::StartCapture => {
                self.capture.start();
            }
            Effect::StopCapture => self.capture.stop(),
            Effect::MarkSchedulerActive => self.scheduler.set_active(true),
            Effect::MarkSchedulerInactive => self.scheduler.set_active(false),
            Effect::EndUtterance => self.scheduler.end_utterance(),
            Effect::StartSettleWatch => self.tasks.push_back(Task::StartSettleWatch),
            Effect::CancelSettleWatch => self.tasks.push_back(Task::CancelSettleWatch),
            Effect::ShowThinking => {
                self.bus
                    .emit_lossy(SessionEvent::ThinkingIndicator { active: true });
            }
            Effect::HideThinkingAfterLinger => self.tasks.push_back(Task::StartThinkingLinger),
            Effect::CancelThinkingLinger => self.tasks.push_back(Task::CancelThinkingLinger),
            Effect::HideThinking => {
                self.bus
                    .emit_lossy(SessionEvent::ThinkingIndicator { active: false });
            }
            Effect::Interrupt => {
                if let Some(outcome) = self.interrupt.interrupt_if_needed(&mut self.scheduler) {
                    self.publish_interrupt(outcome.report);
                    self.send_silence(outcome.silence);
                }
            }
            Effect::FlushPlayback => {
                let report = self.scheduler.interrupt();
                self.publish_interrupt(report);
            }
            Effect::SendTurnComplete => {
                let silence = self.interrupt.silence_frame();
                self.send_silence(silence);
            }
            Effect::Teardown => {
                let report = self.scheduler.teardown();
                self.capture.disarm();
                self.tasks.retain(|task| !matches!(task, Task::Decode(_)));
                self.publish_interrupt(report);
            }
        }
    }

    fn send_silence(&mut self, silence: Bytes) {
        let samples = silence.len() / 2;
        debug!("Sending {} samples of turn-completion silence", samples);
        self.outbox.push_back(Outbound::Binary(silence));
        self.bus.emit_lossy(SessionEvent::TurnCompleted {
            samples,
            timestamp: Utc::now(),
        });
    }

    fn publish_interrupt(&self, report: InterruptReport) {
        if report == InterruptReport::default() {
            return;
        }
        self.bus.emit_lossy(SessionEvent::PlaybackInterrupted {
            discarded_pending: report.discarded_pending,
            discarded_segments: report.discarded_segments,
            timestamp: Utc::now(),
        });
    }

    fn publish_transition(&self, transition: &Transition) {
        let timestamp = Utc::now();
        let emit = |old_state, new_state| {
            self.bus.emit_lossy(SessionEvent::StateChanged {
                old_state,
                new_state,
                timestamp,
            });
        };

        match transition.via {
            Some(via) => {
                emit(transition.from, via);
                emit(via, transition.to);
            }
            None if transition.changed() => emit(transition.from, transition.to),
            None => {}
        }
    }

    fn publish_control(&self, event: &ControlEvent) {
        match event {
            ControlEvent::Transcript { speaker, text } => {
                info!("[{}] {}", speaker, text);
                self.bus.emit_lossy(SessionEvent::Transcript {
                    speaker: speaker.clone(),
                    text: text.clone(),
                    timestamp: Utc::now(),
                });
            }
            ControlEvent::Error(message) => {
                error!("Server error: {}", message);
                self.bus.emit_lossy(SessionEvent::SessionError {
                    message: message.clone(),
                    timestamp: Utc::now(),
                });
            }
            ControlEvent::Log { message, level } => {
                match level {
                    LogLevel::Debug => debug!(target: "hv_session::server", "{}", message),
                    LogLevel::Info => info!(target: "hv_session::server", "{}", message),
                    LogLevel::Warn => warn!(target: "hv_session::server", "{}", message),
                    LogLevel::Error => error!(target: "hv_session::server", "{}", message),
                }
                self.bus.emit_lossy(SessionEvent::ServerLog {
                    message: message.clone(),
                    level: *level,
                });
            }
            _ => {}
        }
    }

    fn publish_drop(&self, sequence: Option<u64>, reason: &str) {
        self.bus.emit_lossy(SessionEvent::ChunkDropped {
            sequence,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::quantize_i16;
    use hv_common::FadeCurve;

    fn core() -> SessionCore {
        let config = SessionConfig::default();
        let graph = OutputGraph::new(config.output_sample_rate, FadeCurve::Linear);
        SessionCore::new(
            &config,
            graph,
            EventBus::new(64),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn text(json: &str) -> InboundFrame {
        InboundFrame::Text(json.to_string())
    }

    fn audio(frames: usize) -> InboundFrame {
        InboundFrame::Binary(Bytes::from(quantize_i16(&vec![0.2; frames])))
    }

    fn speaking_core() -> SessionCore {
        let mut core = core();
        core.on_input(Input::TransportConnected);
        core.on_frame(text(r#"{"type":"session_started"}"#));
        core.on_frame(text(r#"{"type":"assistant_speaking"}"#));
        assert_eq!(core.state(), SessionState::Speaking);
        core
    }

    #[test]
    fn test_audio_frames_become_decode_tasks() {
        let mut core = speaking_core();
        core.on_frame(audio(2_400));

        let tasks = core.take_tasks();
        assert_eq!(tasks.len(), 1);
        assert!(matches!(tasks[0], Task::Decode(_)));
        assert_eq!(core.scheduler().pending_len(), 1);
    }

    #[test]
    fn test_inline_decode_schedules() {
        let mut core = speaking_core();
        core.on_frame(audio(2_400));
        core.run_pending_decodes();

        assert_eq!(core.scheduler().pending_len(), 0);
        assert_eq!(core.scheduler().stats().chunks_scheduled, 1);
        assert!(core.scheduler().graph().meter_attached());
    }

    #[test]
    fn test_key_up_sends_silence() {
        let mut core = core();
        core.on_input(Input::TransportConnected);
        core.on_input(Input::KeyDown);
        assert_eq!(core.state(), SessionState::Recording);
        assert!(core.take_outbound().is_empty());

        core.on_input(Input::KeyUp);
        let out = core.take_outbound();
        assert_eq!(out.len(), 1);
        match &out[0] {
            Outbound::Binary(frame) => assert_eq!(frame.len(), 16_000),
            other => panic!("unexpected outbound {:?}", other),
        }
    }

    #[test]
    fn test_capture_only_while_recording() {
        let mut core = core();
        core.on_input(Input::TransportConnected);

        core.on_capture(&[0.1; 320], 16_000);
        assert!(core.take_outbound().is_empty());

        core.on_input(Input::KeyDown);
        core.on_capture(&[0.1; 320], 16_000);
        let out = core.take_outbound();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Outbound::Binary(frame) if frame.len() == 640));
    }

    #[test]
    fn test_audio_dropped_while_recording() {
        let mut core = core();
        let mut rx = core.bus().subscribe();
        core.on_input(Input::TransportConnected);
        core.on_input(Input::KeyDown);

        core.on_frame(audio(100));
        assert_eq!(core.scheduler().pending_len(), 0);
        assert!(core.take_tasks().is_empty());

        let mut saw_drop = false;
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::ChunkDropped { sequence, .. } = event {
                assert_eq!(sequence, Some(0));
                saw_drop = true;
            }
        }
        assert!(saw_drop);
    }

    #[test]
    fn test_settle_poll_moves_to_listening() {
        let mut core = speaking_core();
        core.on_frame(audio(240));
        core.run_pending_decodes();
        core.on_frame(text(r#"{"type":"assistant_silent"}"#));

        let tasks = core.take_tasks();
        assert!(tasks.iter().any(|t| matches!(t, Task::StartSettleWatch)));

        // 10 ms of audio sits inside the 500 ms grace but is still playing
        assert!(!core.poll_settle());

        let mut block = vec![0.0; 240];
        core.scheduler().graph().render(&mut block);
        assert!(core.poll_settle());
        assert_eq!(core.state(), SessionState::Listening);
        assert!(!core.scheduler().is_active());
        assert!(core
            .take_tasks()
            .iter()
            .any(|t| matches!(t, Task::CancelSettleWatch)));
    }

    #[test]
    fn test_force_settle() {
        let mut core = speaking_core();
        core.on_frame(text(r#"{"type":"assistant_silent"}"#));
        core.force_settle();
        assert_eq!(core.state(), SessionState::Listening);
    }

    #[test]
    fn test_server_log_and_transcript_published() {
        let mut core = core();
        let mut rx = core.bus().subscribe();

        core.on_frame(text(r#"{"type":"server_log","message":"ready","level":"warning"}"#));
        core.on_frame(text(r#"{"type":"transcript","speaker":"user","text":"hi"}"#));

        match rx.try_recv() {
            Ok(SessionEvent::ServerLog { message, level }) => {
                assert_eq!(message, "ready");
                assert_eq!(level, LogLevel::Warn);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Transcript { .. })));
    }

    #[test]
    fn test_disconnect_discards_queued_decodes() {
        let mut core = speaking_core();
        core.on_frame(audio(100));
        core.on_input(Input::TransportDisconnected);

        assert_eq!(core.state(), SessionState::Disconnected);
        assert!(!core
            .take_tasks()
            .iter()
            .any(|t| matches!(t, Task::Decode(_))));
        assert_eq!(core.scheduler().pending_len(), 0);
        assert!(!core.capture().is_armed());
    }

    #[test]
    fn test_share_content_queued() {
        let mut core = core();
        core.send_message(ClientMessage::ShareContent {
            content: serde_json::json!({"text": "notes"}),
        });
        assert!(matches!(
            core.take_outbound().as_slice(),
            [Outbound::Message(ClientMessage::ShareContent { .. })]
        ));
    }
}
