//! Core audio data types
//!
//! Inbound audio moves through two shapes:
//! - `AudioChunk`: the opaque payload as it came off the socket
//! - `PcmBuffer`: decoded mono samples ready to be scheduled

use bytes::Bytes;
use std::time::Instant;

/// One inbound audio payload awaiting playback
///
/// Created by the frame decoder, owned by the playback scheduler until it is
/// played or discarded.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Monotonically assigned arrival index
    pub sequence: u64,

    /// Raw payload (WAV container or raw s16le PCM)
    pub payload: Bytes,

    /// When the payload came off the socket
    pub received_at: Instant,
}

impl AudioChunk {
    pub fn new(sequence: u64, payload: Bytes) -> Self {
        Self {
            sequence,
            payload,
            received_at: Instant::now(),
        }
    }
}

/// Decoded mono audio
///
/// Samples are f32 in -1.0..=1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of mono frames
    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_buffer_duration() {
        let buffer = PcmBuffer::new(vec![0.0; 24_000], 24_000);
        assert_eq!(buffer.frame_count(), 24_000);
        assert!((buffer.duration_seconds() - 1.0).abs() < 1e-9);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_zero_rate_has_zero_duration() {
        let buffer = PcmBuffer::new(vec![0.5; 10], 0);
        assert_eq!(buffer.duration_seconds(), 0.0);
    }
}
