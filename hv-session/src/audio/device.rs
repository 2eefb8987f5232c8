//! Sound card output and microphone capture using cpal
//!
//! Only built with the `device` feature. The output graph is mono; the output
//! callback renders one mono block and copies it to every device channel.
//! Input is downmixed to mono before it reaches the capture path.

use crate::error::{Error, Result};
use crate::playback::graph::OutputGraph;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Callback invoked from the audio thread when a stream fails
pub type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

/// List available output device names
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();
    Ok(devices)
}

fn find_device(name: Option<&str>, output: bool) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        let found = if output {
            host.output_devices().ok().and_then(|mut d| {
                d.find(|dev| dev.name().ok().as_deref() == Some(name))
            })
        } else {
            host.input_devices().ok().and_then(|mut d| {
                d.find(|dev| dev.name().ok().as_deref() == Some(name))
            })
        };
        match found {
            Some(device) => return Ok(device),
            None => warn!("Device '{}' not found, falling back to default", name),
        }
    }

    let device = if output {
        host.default_output_device()
    } else {
        host.default_input_device()
    };

    device.ok_or_else(|| {
        if output {
            Error::AudioOutput("No default output device found".to_string())
        } else {
            Error::AudioInput("No default input device found".to_string())
        }
    })
}

/// Output stream rendering an [`OutputGraph`]
pub struct DeviceOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl DeviceOutput {
    /// Open an output device (default if `device_name` is `None` or unknown)
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name, true)?;
        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        info!(
            "Output device: {} ({}Hz, {} channels, {:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            supported.sample_rate().0,
            supported.channels(),
            supported.sample_format()
        );

        Ok(Self {
            device,
            sample_format: supported.sample_format(),
            config: supported.config(),
            stream: None,
        })
    }

    /// Rate the graph must be created at
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Start pulling blocks from `graph`
    pub fn start(&mut self, graph: OutputGraph, on_error: ErrorCallback) -> Result<()> {
        if graph.sample_rate() != self.sample_rate() {
            return Err(Error::AudioOutput(format!(
                "graph runs at {}Hz but device at {}Hz",
                graph.sample_rate(),
                self.sample_rate()
            )));
        }

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build::<f32>(graph, on_error)?,
            SampleFormat::I16 => self.build::<i16>(graph, on_error)?,
            SampleFormat::U16 => self.build::<u16>(graph, on_error)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        info!("Audio output started");
        Ok(())
    }

    fn build<T>(&self, graph: OutputGraph, on_error: ErrorCallback) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.config.channels as usize;
        let mut mono = Vec::new();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    mono.resize(frames, 0.0);
                    graph.render(&mut mono);

                    for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        let value = T::from_sample(sample.clamp(-1.0, 1.0));
                        frame.fill(value);
                    }
                },
                move |err| {
                    error!("Audio output stream error: {}", err);
                    on_error(format!("audio output failed: {}", err));
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause output stream: {}", e);
            }
            debug!("Audio output stopped");
        }
    }
}

/// Microphone stream feeding the capture path
pub struct DeviceInput {
    stream: Stream,
    sample_rate: u32,
}

impl DeviceInput {
    /// Open an input device and start delivering mono blocks to `sink`
    ///
    /// Blocks are only delivered while `gate` is open.
    pub fn start<F>(
        device_name: Option<&str>,
        gate: Arc<AtomicBool>,
        sink: F,
        on_error: ErrorCallback,
    ) -> Result<Self>
    where
        F: FnMut(Vec<f32>, u32) + Send + 'static,
    {
        let device = find_device(device_name, false)?;
        let supported = device
            .default_input_config()
            .map_err(|e| Error::AudioInput(format!("Failed to get input config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let sample_rate = config.sample_rate.0;

        info!(
            "Input device: {} ({}Hz, {} channels)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate,
            config.channels
        );

        let stream = match sample_format {
            SampleFormat::F32 => build_input::<f32, F>(&device, &config, gate, sink, on_error)?,
            SampleFormat::I16 => build_input::<i16, F>(&device, &config, gate, sink, on_error)?,
            SampleFormat::U16 => build_input::<u16, F>(&device, &config, gate, sink, on_error)?,
            other => {
                return Err(Error::AudioInput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioInput(format!("Failed to start input stream: {}", e)))?;

        Ok(Self {
            stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause input stream: {}", e);
        }
    }
}

fn build_input<T, F>(
    device: &Device,
    config: &StreamConfig,
    gate: Arc<AtomicBool>,
    mut sink: F,
    on_error: ErrorCallback,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
    F: FnMut(Vec<f32>, u32) + Send + 'static,
{
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !gate.load(Ordering::Relaxed) {
                    return;
                }
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| {
                        frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>()
                            / frame.len() as f32
                    })
                    .collect();
                sink(mono, sample_rate);
            },
            move |err| {
                error!("Audio input stream error: {}", err);
                on_error(format!("microphone failed: {}", err));
            },
            None,
        )
        .map_err(|e| Error::AudioInput(format!("Failed to build input stream: {}", e)))
}
