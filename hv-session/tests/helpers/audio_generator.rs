//! Audio payload generation
//!
//! Payloads are built in memory, the way they arrive off the socket: WAV
//! containers via hound, or headerless 16-bit little-endian PCM.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;

/// Mono 16-bit WAV container holding a sine tone
pub fn sine_wav_bytes(sample_rate: u32, frequency: f32, duration_ms: u64) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("wav writer");
        for sample in sine_samples(sample_rate, frequency, duration_ms) {
            writer
                .write_sample((sample * 32767.0) as i16)
                .expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

/// Headerless PCM holding a sine tone
pub fn sine_pcm(sample_rate: u32, frequency: f32, duration_ms: u64) -> Vec<u8> {
    sine_samples(sample_rate, frequency, duration_ms)
        .into_iter()
        .flat_map(|s| ((s * 32767.0) as i16).to_le_bytes())
        .collect()
}

/// Headerless PCM holding a constant level
pub fn constant_pcm(level: f32, frames: usize) -> Vec<u8> {
    let value = (level.clamp(-1.0, 1.0) * 32767.0).round() as i16;
    std::iter::repeat(value)
        .take(frames)
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

fn sine_samples(sample_rate: u32, frequency: f32, duration_ms: u64) -> Vec<f32> {
    let frames = (sample_rate as u64 * duration_ms / 1000) as usize;
    (0..frames)
        .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin() * 0.5)
        .collect()
}
