//! Capture pipeline
//!
//! Microphone blocks come in at whatever rate the source runs at. While
//! recording they are resampled to the upstream input rate, clamped and
//! quantized to s16le; otherwise they are dropped. The shared capture gate
//! lets sources skip work entirely while the gate is closed.
//!
//! One stream resampler lives for the whole recording and is rebuilt only
//! when the source rate changes.

use crate::audio::pcm::quantize_i16;
use crate::audio::resampler::StreamResampler;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Converts captured audio to wire frames while recording
#[derive(Debug)]
pub struct CapturePipeline {
    input_rate: u32,
    gate: Arc<AtomicBool>,
    armed: bool,
    resampler: Option<StreamResampler>,
    frames_sent: u64,
    frames_dropped: u64,
}

impl CapturePipeline {
    /// `input_rate` is the rate the peer expects; `gate` is shared with sources
    pub fn new(input_rate: u32, gate: Arc<AtomicBool>) -> Self {
        gate.store(false, Ordering::SeqCst);
        Self {
            input_rate,
            gate,
            armed: false,
            resampler: None,
            frames_sent: 0,
            frames_dropped: 0,
        }
    }

    /// Session is up; recording may start
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Session is gone; stop and refuse to start
    pub fn disarm(&mut self) {
        self.stop();
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Open the gate; returns false if not armed
    pub fn start(&mut self) -> bool {
        if !self.armed {
            warn!("Capture start requested before the session was up");
            return false;
        }
        self.gate.store(true, Ordering::SeqCst);
        debug!("Capture started");
        true
    }

    pub fn stop(&mut self) {
        if self.gate.swap(false, Ordering::SeqCst) {
            debug!("Capture stopped");
        }
        self.resampler = None;
    }

    pub fn is_recording(&self) -> bool {
        self.gate.load(Ordering::SeqCst)
    }

    /// Convert one captured block; `None` when not recording or on failure
    pub fn process(&mut self, samples: &[f32], sample_rate: u32) -> Option<Bytes> {
        if !self.is_recording() {
            self.frames_dropped += 1;
            return None;
        }

        let resampled = match self.resample(samples, sample_rate) {
            Ok(resampled) => resampled,
            Err(e) => {
                warn!("Dropping capture block: {}", e);
                self.frames_dropped += 1;
                return None;
            }
        };

        if resampled.is_empty() {
            return None;
        }

        self.frames_sent += 1;
        Some(Bytes::from(quantize_i16(&resampled)))
    }

    fn resample(&mut self, samples: &[f32], sample_rate: u32) -> crate::Result<Vec<f32>> {
        if sample_rate == self.input_rate {
            self.resampler = None;
            return Ok(samples.to_vec());
        }
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let resampler = match self.resampler.take() {
            Some(existing) if existing.input_rate() == sample_rate => existing,
            _ => StreamResampler::new(sample_rate, self.input_rate, samples.len())?,
        };
        self.resampler.insert(resampler).process(samples)
    }

    /// Source rate the live resampler was built for, if any
    pub fn resampling_from(&self) -> Option<u32> {
        self.resampler.as_ref().map(StreamResampler::input_rate)
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> CapturePipeline {
        CapturePipeline::new(16_000, Arc::new(AtomicBool::new(true)))
    }

    #[test]
    fn test_gate_closed_on_creation() {
        let capture = pipeline();
        assert!(!capture.is_recording());
    }

    #[test]
    fn test_frames_dropped_when_not_recording() {
        let mut capture = pipeline();
        capture.arm();
        assert!(capture.process(&[0.1; 320], 16_000).is_none());
        assert_eq!(capture.frames_dropped(), 1);
    }

    #[test]
    fn test_start_requires_arm() {
        let mut capture = pipeline();
        assert!(!capture.start());
        capture.arm();
        assert!(capture.start());
        assert!(capture.is_recording());
    }

    #[test]
    fn test_recording_quantizes_and_clamps() {
        let mut capture = pipeline();
        capture.arm();
        capture.start();

        let frame = capture.process(&[0.5, 2.0, -2.0], 16_000).unwrap();
        assert_eq!(frame.len(), 6);
        let values: Vec<i16> = frame
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values[1], i16::MAX);
        assert_eq!(values[2], -i16::MAX);
        assert_eq!(capture.frames_sent(), 1);
    }

    #[test]
    fn test_recording_resamples_to_input_rate() {
        let mut capture = pipeline();
        capture.arm();
        capture.start();

        let frame = capture.process(&[0.0; 960], 48_000).unwrap();
        let samples = frame.len() / 2;
        assert!((310..=330).contains(&samples), "got {} samples", samples);
    }

    #[test]
    fn test_resampler_kept_across_blocks() {
        let mut capture = pipeline();
        capture.arm();
        capture.start();

        let mut total = 0;
        for _ in 0..10 {
            total += capture.process(&[0.1; 960], 48_000).map_or(0, |f| f.len() / 2);
            assert_eq!(capture.resampling_from(), Some(48_000));
        }
        assert!((3_150..=3_250).contains(&total), "got {} samples", total);

        // A new source rate replaces it; the native rate needs none
        capture.process(&[0.1; 441], 44_100);
        assert_eq!(capture.resampling_from(), Some(44_100));
        capture.process(&[0.1; 320], 16_000);
        assert_eq!(capture.resampling_from(), None);
    }

    #[test]
    fn test_stop_discards_resampler() {
        let mut capture = pipeline();
        capture.arm();
        capture.start();
        capture.process(&[0.1; 960], 48_000);

        capture.stop();
        assert_eq!(capture.resampling_from(), None);
    }

    #[test]
    fn test_disarm_closes_gate() {
        let mut capture = pipeline();
        capture.arm();
        capture.start();
        capture.disarm();
        assert!(!capture.is_recording());
        assert!(!capture.start());
    }
}
