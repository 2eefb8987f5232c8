//! Interrupt controller
//!
//! Push-to-talk while the assistant is audible cuts the assistant off: all
//! pending and scheduled audio goes, the meter is detached, and the peer gets
//! a turn-completion frame of silence so its turn detection closes the
//! assistant turn.

use crate::audio::pcm::silence_frame;
use crate::playback::scheduler::{InterruptReport, PlaybackScheduler};
use bytes::Bytes;
use tracing::info;

/// Result of a fired interrupt
#[derive(Debug, Clone)]
pub struct InterruptOutcome {
    pub report: InterruptReport,
    /// Silence frame to send to the peer, exactly once
    pub silence: Bytes,
}

/// Decides whether an interrupt is needed and builds the silence frame
#[derive(Debug, Clone)]
pub struct InterruptController {
    silence_samples: usize,
    fired: u64,
}

impl InterruptController {
    /// `silence_samples` is the frame length at the upstream input rate
    pub fn new(silence_samples: usize) -> Self {
        Self {
            silence_samples,
            fired: 0,
        }
    }

    /// Interrupt playback if there is anything to interrupt
    ///
    /// Fires when the scheduler has pending or audible audio, or is still
    /// marked active for an assistant turn. Returns `None` otherwise.
    pub fn interrupt_if_needed(
        &mut self,
        scheduler: &mut PlaybackScheduler,
    ) -> Option<InterruptOutcome> {
        if !scheduler.has_audio() && !scheduler.is_active() {
            return None;
        }

        let report = scheduler.interrupt();
        scheduler.set_active(false);
        self.fired += 1;

        info!(
            "Interrupted assistant: {} pending and {} scheduled chunks discarded",
            report.discarded_pending, report.discarded_segments
        );

        Some(InterruptOutcome {
            report,
            silence: self.silence_frame(),
        })
    }

    /// The turn-completion frame
    pub fn silence_frame(&self) -> Bytes {
        silence_frame(self.silence_samples)
    }

    pub fn silence_samples(&self) -> usize {
        self.silence_samples
    }

    /// How many interrupts actually fired
    pub fn fired_count(&self) -> u64 {
        self.fired
    }
}
