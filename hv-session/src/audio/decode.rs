//! Inbound audio payload decoding
//!
//! Payloads arrive in one of two shapes:
//! - A RIFF/WAV container (what the session server sends), decoded with hound
//! - Headerless signed 16-bit little-endian mono PCM at a fallback rate
//!
//! Multi-channel WAV is downmixed to mono by averaging.

use super::pcm::pcm16_to_f32;
use super::types::PcmBuffer;
use crate::error::{Error, Result};
use hound::{SampleFormat, WavReader};
use std::io::Cursor;

const RIFF_MAGIC: &[u8; 4] = b"RIFF";

/// True if the payload carries a WAV container header
pub fn is_wav(payload: &[u8]) -> bool {
    payload.len() >= 12 && &payload[0..4] == RIFF_MAGIC && &payload[8..12] == b"WAVE"
}

/// Decode one payload into mono samples
///
/// `fallback_rate` applies to headerless PCM only.
pub fn decode_audio(payload: &[u8], fallback_rate: u32) -> Result<PcmBuffer> {
    if payload.is_empty() {
        return Err(Error::Decode("empty payload".to_string()));
    }

    if payload.starts_with(RIFF_MAGIC) {
        return decode_wav(payload);
    }

    if payload.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "raw PCM payload has odd length {}",
            payload.len()
        )));
    }

    Ok(PcmBuffer::new(pcm16_to_f32(payload), fallback_rate))
}

fn decode_wav(payload: &[u8]) -> Result<PcmBuffer> {
    let mut reader = WavReader::new(Cursor::new(payload))?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(Error::Decode(format!(
            "unusable WAV header: {} channels at {}Hz",
            spec.channels, spec.sample_rate
        )));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()?,
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(PcmBuffer::new(samples, spec.sample_rate))
}
