//! Output graph: the shared mixing timeline
//!
//! Holds every scheduled segment at an absolute frame position and renders
//! them into blocks for whatever sink drives the clock (a device callback or
//! a paced file writer). The clock only advances by frames actually rendered,
//! so scheduling math done in frames never drifts against playback.
//!
//! # Sharing
//!
//! `OutputGraph` is a cheap clone over `Arc<Mutex<..>>`. The scheduler owns
//! the segment list; sinks only call [`OutputGraph::render`]. A poisoned lock
//! is recovered rather than propagated: a panic in one render must not take
//! the whole session down.

use super::meter::LevelMeter;
use hv_common::FadeCurve;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Identifies a segment inside one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(u64);

/// Result of placing a segment on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledSegment {
    pub id: SegmentId,

    /// First frame of the segment (absolute)
    pub start_frame: u64,

    /// One past the last frame (absolute)
    pub end_frame: u64,

    /// Length of the fade-in envelope
    pub fade_in_frames: u64,
}

/// Where a grouped segment goes, decided against the clock
///
/// Built by the closure passed to [`OutputGraph::schedule_with`], which sees
/// the clock value read under the same lock that inserts the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub start_frame: u64,
    pub fade_in_frames: u64,

    /// Fade out every segment of the same group still sounding at
    /// `start_frame`, over the new segment's fade-in
    pub crossfade: bool,
}

#[derive(Debug)]
struct Segment {
    id: SegmentId,
    group: Option<u64>,
    start_frame: u64,
    samples: Vec<f32>,
    fade_in_frames: u64,
    /// (absolute start frame, length); envelopes multiply
    fade_outs: Vec<(u64, u64)>,
}

impl Segment {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }

    fn gain_at(&self, frame: u64, curve: FadeCurve) -> f32 {
        let offset = frame - self.start_frame;
        let mut gain = 1.0;

        if offset < self.fade_in_frames {
            gain *= curve.fade_in(offset as f32 / self.fade_in_frames as f32);
        }

        for &(start, len) in &self.fade_outs {
            if frame >= start {
                gain *= if len == 0 {
                    0.0
                } else {
                    curve.fade_out((frame - start) as f32 / len as f32)
                };
            }
        }

        gain
    }
}

#[derive(Debug)]
struct GraphInner {
    sample_rate: u32,
    curve: FadeCurve,
    frames_written: u64,
    segments: Vec<Segment>,
    meter: Option<LevelMeter>,
    next_id: u64,
}

impl GraphInner {
    fn insert(
        &mut self,
        group: Option<u64>,
        start_frame: u64,
        samples: Vec<f32>,
        fade_in_frames: u64,
    ) -> ScheduledSegment {
        let start_frame = start_frame.max(self.frames_written);
        let id = SegmentId(self.next_id);
        self.next_id += 1;

        let segment = Segment {
            id,
            group,
            start_frame,
            fade_in_frames: fade_in_frames.min(samples.len() as u64),
            samples,
            fade_outs: Vec::new(),
        };
        let scheduled = ScheduledSegment {
            id,
            start_frame,
            end_frame: segment.end_frame(),
            fade_in_frames: segment.fade_in_frames,
        };
        self.segments.push(segment);

        scheduled
    }
}

/// Shared output timeline
#[derive(Debug, Clone)]
pub struct OutputGraph {
    inner: Arc<Mutex<GraphInner>>,
    level: Arc<AtomicU32>,
}

impl OutputGraph {
    /// Create an empty graph rendering at `sample_rate`
    pub fn new(sample_rate: u32, curve: FadeCurve) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GraphInner {
                sample_rate,
                curve,
                frames_written: 0,
                segments: Vec::new(),
                meter: None,
                next_id: 0,
            })),
            level: Arc::new(AtomicU32::new(0f32.to_bits())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GraphInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    pub fn fade_curve(&self) -> FadeCurve {
        self.lock().curve
    }

    /// Output clock in frames
    pub fn current_frame(&self) -> u64 {
        self.lock().frames_written
    }

    /// Output clock in seconds
    pub fn current_time(&self) -> f64 {
        let inner = self.lock();
        inner.frames_written as f64 / inner.sample_rate as f64
    }

    /// Place `samples` on the timeline
    ///
    /// A start in the past is moved up to the clock (the head is never
    /// skipped). The returned segment carries the position actually used.
    pub fn schedule(
        &self,
        start_frame: u64,
        samples: Vec<f32>,
        fade_in_frames: u64,
    ) -> ScheduledSegment {
        let mut inner = self.lock();
        inner.insert(None, start_frame, samples, fade_in_frames)
    }

    /// Place a segment of `group`, computing the position from the clock
    ///
    /// `place` receives the clock and runs under the graph lock, so the
    /// position it returns cannot go stale before the segment is inserted.
    /// With `crossfade` set, every segment of the same group that still
    /// sounds at the new start is faded out across the new fade-in. The
    /// envelope is multiplied into any fade-out already attached, so a chain
    /// of overlapping segments keeps summing to unity gain.
    pub fn schedule_with<F>(&self, group: u64, samples: Vec<f32>, place: F) -> ScheduledSegment
    where
        F: FnOnce(u64) -> Placement,
    {
        let mut inner = self.lock();
        let placement = place(inner.frames_written);

        let scheduled = inner.insert(
            Some(group),
            placement.start_frame,
            samples,
            placement.fade_in_frames,
        );

        if placement.crossfade && scheduled.fade_in_frames > 0 {
            let fade = (scheduled.start_frame, scheduled.fade_in_frames);
            for segment in inner.segments.iter_mut().filter(|s| {
                s.group == Some(group)
                    && s.id != scheduled.id
                    && s.end_frame() > scheduled.start_frame
            }) {
                segment.fade_outs.push(fade);
            }
        }

        scheduled
    }

    /// Attach a fade-out envelope to a scheduled segment
    ///
    /// Composes with envelopes already attached.
    /// Returns false if the segment already finished or was stopped.
    pub fn set_fade_out(&self, id: SegmentId, start_frame: u64, frames: u64) -> bool {
        let mut inner = self.lock();
        match inner.segments.iter_mut().find(|s| s.id == id) {
            Some(segment) => {
                segment.fade_outs.push((start_frame, frames));
                true
            }
            None => false,
        }
    }

    /// True while any segment has frames left to render
    pub fn is_playing(&self) -> bool {
        let inner = self.lock();
        let now = inner.frames_written;
        inner.segments.iter().any(|s| s.end_frame() > now)
    }

    /// Number of segments not yet pruned
    pub fn segment_count(&self) -> usize {
        self.lock().segments.len()
    }

    /// Stop and drop every segment; returns how many were dropped
    pub fn stop_all(&self) -> usize {
        let mut inner = self.lock();
        let count = inner.segments.len();
        inner.segments.clear();
        if count > 0 {
            debug!("Stopped {} scheduled segments", count);
        }
        count
    }

    /// Start metering rendered output
    pub fn attach_meter(&self) {
        let mut inner = self.lock();
        if inner.meter.is_none() {
            inner.meter = Some(LevelMeter::new());
        }
    }

    /// Stop metering; safe to call when already detached
    pub fn detach_meter(&self) {
        self.lock().meter = None;
        self.level.store(0f32.to_bits(), Ordering::Relaxed);
    }

    pub fn meter_attached(&self) -> bool {
        self.lock().meter.is_some()
    }

    /// Latest metered level (0.0 when detached)
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    /// Mix the next `out.len()` frames and advance the clock
    pub fn render(&self, out: &mut [f32]) {
        let mut inner = self.lock();
        let block_start = inner.frames_written;
        let block_end = block_start + out.len() as u64;
        let curve = inner.curve;

        out.fill(0.0);

        for segment in &inner.segments {
            let from = segment.start_frame.max(block_start);
            let to = segment.end_frame().min(block_end);
            for frame in from..to {
                let sample = segment.samples[(frame - segment.start_frame) as usize];
                out[(frame - block_start) as usize] += sample * segment.gain_at(frame, curve);
            }
        }

        inner.frames_written = block_end;
        inner.segments.retain(|s| s.end_frame() > block_end);

        if let Some(meter) = inner.meter.as_mut() {
            let level = meter.process(out);
            self.level.store(level.to_bits(), Ordering::Relaxed);
        }
    }
}
