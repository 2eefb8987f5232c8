//! WAV file capture source
//!
//! Stands in for a microphone: the file is replayed in real time, one block
//! per block period, and only while the capture gate is open. Playback
//! position holds while the gate is closed and wraps at the end of the file.

use super::decode::decode_audio;
use super::types::PcmBuffer;
use crate::error::{Error, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Real-time replay of a WAV file into the capture path
pub struct WavCaptureSource {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WavCaptureSource {
    /// Load `path` and start replaying into `sink`
    ///
    /// `sink` receives mono blocks and their sample rate.
    pub fn start<F>(
        path: &Path,
        block_frames: usize,
        gate: Arc<AtomicBool>,
        sink: F,
    ) -> Result<Self>
    where
        F: FnMut(Vec<f32>, u32) + Send + 'static,
    {
        let bytes = std::fs::read(path)?;
        let pcm = decode_audio(&bytes, 16_000)?;
        if pcm.is_empty() {
            return Err(Error::AudioInput(format!(
                "{} has no audio to replay",
                path.display()
            )));
        }

        info!(
            "Capture source: {} ({:.1}s at {}Hz)",
            path.display(),
            pcm.duration_seconds(),
            pcm.sample_rate
        );

        Self::start_buffer(pcm, block_frames, gate, sink)
    }

    /// Replay an in-memory buffer
    pub fn start_buffer<F>(
        pcm: PcmBuffer,
        block_frames: usize,
        gate: Arc<AtomicBool>,
        mut sink: F,
    ) -> Result<Self>
    where
        F: FnMut(Vec<f32>, u32) + Send + 'static,
    {
        if pcm.is_empty() || block_frames == 0 {
            return Err(Error::AudioInput(
                "capture buffer and block size must be non-empty".to_string(),
            ));
        }

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("hv-capture".to_string())
            .spawn(move || {
                let block_duration =
                    Duration::from_secs_f64(block_frames as f64 / pcm.sample_rate as f64);
                let mut position = 0usize;
                let mut deadline = Instant::now();

                while thread_running.load(Ordering::Relaxed) {
                    if gate.load(Ordering::Relaxed) {
                        let block = next_block(&pcm.samples, &mut position, block_frames);
                        sink(block, pcm.sample_rate);
                    }

                    deadline += block_duration;
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    } else {
                        deadline = now;
                    }
                }
                debug!("Capture source stopped");
            })
            .map_err(|e| Error::AudioInput(format!("failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WavCaptureSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Copy the next block, wrapping at the end
fn next_block(samples: &[f32], position: &mut usize, frames: usize) -> Vec<f32> {
    let mut block = Vec::with_capacity(frames);
    while block.len() < frames {
        let take = (frames - block.len()).min(samples.len() - *position);
        block.extend_from_slice(&samples[*position..*position + take]);
        *position = (*position + take) % samples.len();
    }
    block
}
