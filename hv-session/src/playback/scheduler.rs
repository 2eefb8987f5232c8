//! Playback scheduler
//!
//! Turns inbound audio chunks into segments on the output graph:
//! - Chunks enter a FIFO pending queue as they arrive
//! - Each chunk is decoded (possibly off-thread) into mono samples at the
//!   output rate
//! - Decoded chunks leave the queue strictly in arrival order, even when a
//!   later decode finishes first
//!
//! # Timeline cursor
//!
//! `next_chunk_frame` is the first frame at which output is guaranteed silent
//! going forward. Each scheduled segment moves it to the segment's end, so it
//! only ever grows, until an interrupt resets it to the output clock.
//!
//! # Placement
//!
//! With `F` the fade window and `now` the output clock sampled once per
//! segment:
//! - Same utterance, cursor in the future: start at `max(now, cursor - F)`,
//!   fade in over the overlap while every earlier segment of the utterance
//!   still sounding there fades out
//! - New utterance, cursor in the future: append at the cursor, fade-in only
//! - Cursor in the past: start at `now`, fade-in only
//!
//! The clock is read under the graph lock that inserts the segment, so the
//! placement never races a render.
//!
//! # Settling
//!
//! Every segment ends at or before the cursor, so "nothing sounds past
//! `now + grace`" is just `cursor <= now + grace`.
//!
//! # Generations
//!
//! Every interrupt bumps the generation. Decode jobs carry the generation
//! they were issued under, and a result from an older generation is thrown
//! away, so audio decoded across an interrupt never reaches the graph.

use super::graph::{OutputGraph, Placement, ScheduledSegment};
use crate::audio::decode::decode_audio;
use crate::audio::resampler::Resampler;
use crate::audio::types::AudioChunk;
use crate::error::Result;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Off-thread decode work for one pending chunk
#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub generation: u64,
    pub sequence: u64,
    payload: Bytes,
    fallback_rate: u32,
    output_rate: u32,
}

impl DecodeJob {
    /// Decode and resample to the output rate (blocking)
    pub fn run(self) -> DecodeOutcome {
        let result = decode_audio(&self.payload, self.fallback_rate).and_then(|pcm| {
            Resampler::resample(&pcm.samples, pcm.sample_rate, self.output_rate)
        });

        DecodeOutcome {
            generation: self.generation,
            sequence: self.sequence,
            result,
        }
    }
}

/// Finished decode, handed back to [`PlaybackScheduler::complete_decode`]
#[derive(Debug)]
pub struct DecodeOutcome {
    pub generation: u64,
    pub sequence: u64,
    pub result: Result<Vec<f32>>,
}

/// A chunk that was dropped instead of played
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedChunk {
    pub sequence: u64,
    pub reason: String,
}

/// What one drain of the pending queue did
#[derive(Debug, Default)]
pub struct DrainReport {
    pub scheduled: Vec<ScheduledSegment>,
    pub dropped: Vec<DroppedChunk>,
    /// The outcome belonged to an older generation and was ignored
    pub stale: bool,
}

/// What an interrupt threw away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptReport {
    pub discarded_pending: usize,
    pub discarded_segments: usize,
}

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub chunks_scheduled: u64,
    pub chunks_dropped: u64,
    pub stale_decodes: u64,
    pub interrupts: u64,
}

#[derive(Debug)]
struct PendingChunk {
    chunk: AudioChunk,
    utterance: u64,
    decoded: Option<Result<Vec<f32>>>,
}

/// Owns the pending queue and the timeline cursor
pub struct PlaybackScheduler {
    graph: OutputGraph,
    output_rate: u32,
    fallback_rate: u32,
    fade_window_frames: u64,
    pending: VecDeque<PendingChunk>,
    next_chunk_frame: u64,
    active: bool,
    generation: u64,
    utterance: u64,
    last_utterance: Option<u64>,
    stats: SchedulerStats,
}

impl PlaybackScheduler {
    /// Create a scheduler over `graph`
    ///
    /// Headerless PCM payloads are assumed to be at the graph rate.
    pub fn new(graph: OutputGraph, fade_window: Duration) -> Self {
        let output_rate = graph.sample_rate();
        let fade_window_frames = duration_to_frames(fade_window, output_rate);
        let next_chunk_frame = graph.current_frame();

        Self {
            graph,
            output_rate,
            fallback_rate: output_rate,
            fade_window_frames,
            pending: VecDeque::new(),
            next_chunk_frame,
            active: false,
            generation: 0,
            utterance: 0,
            last_utterance: None,
            stats: SchedulerStats::default(),
        }
    }

    /// Override the rate assumed for headerless PCM payloads
    pub fn with_fallback_rate(mut self, rate: u32) -> Self {
        self.fallback_rate = rate;
        self
    }

    pub fn graph(&self) -> &OutputGraph {
        &self.graph
    }

    /// Decode, resample and schedule one chunk inline
    pub fn enqueue(&mut self, chunk: AudioChunk) -> DrainReport {
        let job = self.push(chunk);
        let outcome = job.run();
        self.complete_decode(outcome)
    }

    /// Record a chunk as pending and hand back its decode job
    pub fn push(&mut self, chunk: AudioChunk) -> DecodeJob {
        debug!(
            "Queued chunk #{} ({} bytes, {} pending)",
            chunk.sequence,
            chunk.payload.len(),
            self.pending.len() + 1
        );

        let job = DecodeJob {
            generation: self.generation,
            sequence: chunk.sequence,
            payload: chunk.payload.clone(),
            fallback_rate: self.fallback_rate,
            output_rate: self.output_rate,
        };

        self.pending.push_back(PendingChunk {
            chunk,
            utterance: self.utterance,
            decoded: None,
        });

        job
    }

    /// Store a decode result and schedule everything now ready at the head
    pub fn complete_decode(&mut self, outcome: DecodeOutcome) -> DrainReport {
        let mut report = DrainReport::default();

        if outcome.generation != self.generation {
            debug!(
                "Discarding decode of chunk #{} from generation {} (now {})",
                outcome.sequence, outcome.generation, self.generation
            );
            self.stats.stale_decodes += 1;
            report.stale = true;
            return report;
        }

        match self
            .pending
            .iter_mut()
            .find(|p| p.chunk.sequence == outcome.sequence)
        {
            Some(entry) => entry.decoded = Some(outcome.result),
            None => {
                warn!("Decode finished for unknown chunk #{}", outcome.sequence);
                return report;
            }
        }

        while self
            .pending
            .front()
            .is_some_and(|p| p.decoded.is_some())
        {
            let Some(entry) = self.pending.pop_front() else {
                break;
            };
            let sequence = entry.chunk.sequence;

            let samples = match entry.decoded {
                Some(Ok(samples)) if !samples.is_empty() => samples,
                Some(Ok(_)) => {
                    report.dropped.push(self.drop_chunk(sequence, "no audio frames".to_string()));
                    continue;
                }
                Some(Err(e)) => {
                    report.dropped.push(self.drop_chunk(sequence, e.to_string()));
                    continue;
                }
                None => continue,
            };

            let segment = self.schedule_samples(samples, entry.utterance);
            debug!(
                "Scheduled chunk #{} at frames {}..{} (fade-in {})",
                sequence, segment.start_frame, segment.end_frame, segment.fade_in_frames
            );
            report.scheduled.push(segment);
        }

        report
    }

    fn drop_chunk(&mut self, sequence: u64, reason: String) -> DroppedChunk {
        warn!("Dropping audio chunk #{}: {}", sequence, reason);
        self.stats.chunks_dropped += 1;
        DroppedChunk { sequence, reason }
    }

    fn schedule_samples(&mut self, samples: Vec<f32>, utterance: u64) -> ScheduledSegment {
        let cursor = self.next_chunk_frame;
        let len = samples.len() as u64;
        let fade = self.fade_window_frames;
        let continues_utterance = self.last_utterance == Some(utterance);

        let segment = self.graph.schedule_with(utterance, samples, |now| {
            if cursor > now && continues_utterance {
                let overlap = (cursor - now).min(fade).min(len);
                Placement {
                    start_frame: cursor - overlap,
                    fade_in_frames: overlap,
                    crossfade: true,
                }
            } else {
                Placement {
                    start_frame: cursor.max(now),
                    fade_in_frames: fade,
                    crossfade: false,
                }
            }
        });

        self.graph.attach_meter();
        self.next_chunk_frame = self.next_chunk_frame.max(segment.end_frame);
        self.last_utterance = Some(utterance);
        self.stats.chunks_scheduled += 1;

        segment
    }

    /// True once playback has drained to within `grace`
    ///
    /// Nothing is pending and no scheduled audio extends more than `grace`
    /// past the output clock. A tail shorter than `grace` may still be
    /// audible.
    pub fn is_settled(&self, grace: Duration) -> bool {
        let now = self.graph.current_frame();
        let grace_frames = duration_to_frames(grace, self.output_rate);

        self.pending.is_empty() && self.next_chunk_frame <= now + grace_frames
    }

    /// True while anything is pending or audible
    pub fn has_audio(&self) -> bool {
        !self.pending.is_empty() || self.graph.is_playing()
    }

    /// Discard pending and scheduled audio and reset the cursor to now
    ///
    /// Safe to call in any state; calling it twice in a row leaves the same
    /// state as calling it once.
    pub fn interrupt(&mut self) -> InterruptReport {
        let report = InterruptReport {
            discarded_pending: self.pending.len(),
            discarded_segments: self.graph.stop_all(),
        };

        self.pending.clear();
        self.graph.detach_meter();
        self.next_chunk_frame = self.graph.current_frame();
        self.last_utterance = None;
        self.generation += 1;
        self.stats.interrupts += 1;

        if report != InterruptReport::default() {
            info!(
                "Playback interrupted: {} pending, {} scheduled discarded",
                report.discarded_pending, report.discarded_segments
            );
        }

        report
    }

    /// Interrupt and mark inactive; used when the session goes away
    pub fn teardown(&mut self) -> InterruptReport {
        let report = self.interrupt();
        self.active = false;
        self.utterance += 1;
        report
    }

    /// Close the current utterance; the next chunk starts a new one
    pub fn end_utterance(&mut self) {
        self.utterance += 1;
    }

    /// Mark whether the assistant turn is live
    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            debug!("Scheduler active: {}", active);
        }
        self.active = active;
        if !active {
            self.graph.detach_meter();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Timeline cursor in output frames
    pub fn next_chunk_frame(&self) -> u64 {
        self.next_chunk_frame
    }

    /// Timeline cursor in seconds
    pub fn next_chunk_time(&self) -> f64 {
        self.next_chunk_frame as f64 / self.output_rate as f64
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fade_window_frames(&self) -> u64 {
        self.fade_window_frames
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

fn duration_to_frames(duration: Duration, sample_rate: u32) -> u64 {
    (duration.as_secs_f64() * sample_rate as f64).round() as u64
}
