//! Paced output sinks
//!
//! Without a sound card something still has to pull blocks out of the graph
//! at real-time speed, or the output clock would never move. A render thread
//! does that, writing each block to a WAV file or discarding it.

use crate::error::{Error, Result};
use crate::playback::graph::OutputGraph;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where rendered blocks go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// 16-bit mono WAV at the graph rate
    WavFile(PathBuf),
    /// Render and discard
    Null,
}

/// Real-time render thread driving an [`OutputGraph`]
pub struct PacedSink {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<u64>>>,
}

impl PacedSink {
    /// Start rendering `block_frames` at a time at the graph's rate
    pub fn start(graph: OutputGraph, target: SinkTarget, block_frames: usize) -> Result<Self> {
        if block_frames == 0 {
            return Err(Error::AudioOutput("block size must be non-zero".to_string()));
        }

        let mut writer = match &target {
            SinkTarget::WavFile(path) => Some(create_writer(path, graph.sample_rate())?),
            SinkTarget::Null => None,
        };

        info!("Starting output sink {:?} at {}Hz", target, graph.sample_rate());

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("hv-output".to_string())
            .spawn(move || -> Result<u64> {
                let block_duration =
                    Duration::from_secs_f64(block_frames as f64 / graph.sample_rate() as f64);
                let mut block = vec![0.0f32; block_frames];
                let mut frames_written = 0u64;
                let mut deadline = Instant::now();

                while thread_running.load(Ordering::Relaxed) {
                    graph.render(&mut block);

                    if let Some(w) = writer.as_mut() {
                        for &sample in &block {
                            w.write_sample(to_i16(sample))?;
                        }
                    }
                    frames_written += block_frames as u64;

                    deadline += block_duration;
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    } else if now - deadline > block_duration * 10 {
                        warn!("Output sink fell behind by {:?}, resyncing", now - deadline);
                        deadline = now;
                    }
                }

                if let Some(w) = writer {
                    w.finalize()?;
                }
                debug!("Output sink wrote {} frames", frames_written);
                Ok(frames_written)
            })
            .map_err(|e| Error::AudioOutput(format!("failed to spawn output thread: {}", e)))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop rendering; returns the number of frames rendered
    pub fn stop(mut self) -> Result<u64> {
        self.running.store(false, Ordering::Relaxed);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::AudioOutput("output thread panicked".to_string()))?,
            None => Ok(0),
        }
    }
}

impl Drop for PacedSink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn create_writer(path: &Path, sample_rate: u32) -> Result<WavWriter<BufWriter<File>>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    Ok(WavWriter::create(path, spec)?)
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_common::FadeCurve;

    #[test]
    fn test_wav_sink_records_scheduled_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let graph = OutputGraph::new(8_000, FadeCurve::Linear);
        graph.schedule(0, vec![0.5; 400], 0);

        let sink = PacedSink::start(graph.clone(), SinkTarget::WavFile(path.clone()), 80).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        let frames = sink.stop().unwrap();

        assert!(frames >= 400, "only {} frames rendered", frames);
        assert!(graph.current_frame() >= 400);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8_000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len() as u64, frames);
        assert!(samples[..400].iter().all(|&s| s > 16_000));
    }

    #[test]
    fn test_null_sink_advances_clock() {
        let graph = OutputGraph::new(8_000, FadeCurve::Linear);
        let sink = PacedSink::start(graph.clone(), SinkTarget::Null, 80).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        sink.stop().unwrap();
        assert!(graph.current_frame() > 0);
    }

    #[test]
    fn test_zero_block_rejected() {
        let graph = OutputGraph::new(8_000, FadeCurve::Linear);
        assert!(PacedSink::start(graph, SinkTarget::Null, 0).is_err());
    }
}
