//! Audio resampling using rubato
//!
//! Inbound audio is converted to the output timeline rate before scheduling;
//! captured microphone audio is converted to the upstream input rate.
//! Everything here is mono.
//!
//! [`Resampler::resample`] handles one self-contained buffer. Live capture
//! uses [`StreamResampler`], which keeps one rubato instance (and its filter
//! history) across blocks.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Mono sample rate converter
pub struct Resampler;

impl Resampler {
    /// Resample mono audio from `input_rate` to `output_rate`
    ///
    /// Returns a copy when the rates already match or the input is empty.
    pub fn resample(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
        if input_rate == output_rate || input.is_empty() {
            return Ok(input.to_vec());
        }
        if input_rate == 0 || output_rate == 0 {
            return Err(Error::Decode(format!(
                "cannot resample {}Hz -> {}Hz",
                input_rate, output_rate
            )));
        }

        let mut resampler = Self::create_resampler(input_rate, output_rate, input.len())?;

        let planar_input = vec![input.to_vec()];
        let mut planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        let output = planar_output.pop().unwrap_or_default();

        debug!(
            "Resampled {} frames at {}Hz to {} frames at {}Hz",
            input.len(),
            input_rate,
            output.len(),
            output_rate
        );

        Ok(output)
    }

    /// Expected output length for `frames` input frames
    pub fn output_frames(frames: usize, input_rate: u32, output_rate: u32) -> usize {
        if input_rate == 0 {
            return 0;
        }
        (frames as u64 * output_rate as u64 / input_rate as u64) as usize
    }

    /// FastFixedIn sized to process the whole input in one call
    fn create_resampler(
        input_rate: u32,
        output_rate: u32,
        chunk_size: usize,
    ) -> Result<FastFixedIn<f32>> {
        FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0, // fixed ratio
            PolynomialDegree::Septic,
            chunk_size,
            1,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))
    }
}

/// Resampler for a continuous mono stream at a fixed pair of rates
///
/// Input is buffered until a full rubato chunk is available, so blocks of
/// any size can be fed in and output comes back as soon as it is ready.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    buffered: Vec<f32>,
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("buffered", &self.buffered.len())
            .finish()
    }
}

impl StreamResampler {
    /// `chunk_frames` is the rubato input chunk; usually the capture block
    pub fn new(input_rate: u32, output_rate: u32, chunk_frames: usize) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 || chunk_frames == 0 {
            return Err(Error::AudioInput(format!(
                "cannot stream {}Hz -> {}Hz in chunks of {}",
                input_rate, output_rate, chunk_frames
            )));
        }

        let resampler = Resampler::create_resampler(input_rate, output_rate, chunk_frames)?;
        debug!(
            "Stream resampler {}Hz -> {}Hz, {} frame chunks",
            input_rate, output_rate, chunk_frames
        );

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            buffered: Vec::with_capacity(chunk_frames * 2),
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Input frames held back waiting for a full chunk
    pub fn buffered_frames(&self) -> usize {
        self.buffered.len()
    }

    /// Feed one block; returns whatever output is ready (possibly none)
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.buffered.extend_from_slice(input);

        let mut output = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.buffered.len() < needed {
                break;
            }

            let chunk: Vec<f32> = self.buffered.drain(..needed).collect();
            let planar = self
                .resampler
                .process(&[chunk], None)
                .map_err(|e| Error::AudioInput(format!("Resampling failed: {}", e)))?;
            if let Some(channel) = planar.into_iter().next() {
                output.extend(channel);
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        let output = Resampler::resample(&input, 24_000, 24_000).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_resample_empty() {
        let output = Resampler::resample(&[], 48_000, 16_000).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_resample_zero_rate_rejected() {
        assert!(Resampler::resample(&[0.1, 0.2], 0, 16_000).is_err());
    }

    #[test]
    fn test_resample_down_to_input_rate() {
        let input_rate = 48_000;
        let frames = 4_800;
        let input: Vec<f32> = (0..frames)
            .map(|i| {
                let t = i as f32 / input_rate as f32;
                (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
            })
            .collect();

        let output = Resampler::resample(&input, input_rate, 16_000).unwrap();

        let expected = Resampler::output_frames(frames, input_rate, 16_000);
        assert!(
            output.len() + 10 >= expected && output.len() <= expected + 10,
            "Expected ~{} frames, got {}",
            expected,
            output.len()
        );
    }

    #[test]
    fn test_stream_buffers_partial_chunks() {
        let mut stream = StreamResampler::new(48_000, 16_000, 960).unwrap();

        assert!(stream.process(&[0.0; 500]).unwrap().is_empty());
        assert_eq!(stream.buffered_frames(), 500);

        let out = stream.process(&[0.0; 500]).unwrap();
        assert!((310..=330).contains(&out.len()), "got {}", out.len());
        assert_eq!(stream.buffered_frames(), 40);
    }

    #[test]
    fn test_stream_output_tracks_total_input() {
        let mut stream = StreamResampler::new(48_000, 16_000, 960).unwrap();
        let total: usize = (0..50)
            .map(|_| stream.process(&[0.25; 960]).unwrap().len())
            .sum();

        let expected = Resampler::output_frames(50 * 960, 48_000, 16_000);
        assert!(total.abs_diff(expected) <= 20, "expected ~{}, got {}", expected, total);
    }

    #[test]
    fn test_stream_rejects_zero_chunk() {
        assert!(StreamResampler::new(48_000, 16_000, 0).is_err());
    }
}
