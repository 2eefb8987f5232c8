//! 16-bit PCM wire format helpers
//!
//! Everything sent upstream is signed 16-bit little-endian mono PCM.
//! Quantization clamps first so out-of-range input saturates instead of
//! wrapping around.

use bytes::Bytes;

/// Quantize f32 samples to s16le bytes
pub fn quantize_i16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // NaN clamps to NaN and then casts to 0
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Convert s16le bytes to f32 samples
///
/// A trailing odd byte is ignored; callers that care reject odd lengths first.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// All-zero s16le frame of `samples` samples
pub fn silence_frame(samples: usize) -> Bytes {
    Bytes::from(vec![0u8; samples * 2])
}
