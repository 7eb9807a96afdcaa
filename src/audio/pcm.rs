//! PCM sample conversion between capture floats and the 16-bit wire format.
//!
//! Outbound audio is captured as f32 samples in [-1, 1] and converted to
//! 16-bit signed integers: negatives scale by the full negative range
//! (32768), non-negatives by the positive range (32767), truncating toward
//! zero. The conversion is lossy and one-directional; `decode` exists for
//! the inbound path and round-trips within one quantization step.
//!
//! Inbound fragments arrive as raw little-endian PCM16 bytes.

use crate::error::{VoiceError, VoiceResult};

/// Scale factor for negative samples (full 16-bit negative range).
const NEGATIVE_SCALE: f32 = 32768.0;

/// Scale factor for non-negative samples.
const POSITIVE_SCALE: f32 = 32767.0;

/// Convert float samples in [-1, 1] to 16-bit signed integers.
///
/// Samples outside [-1, 1] are clamped first.
pub fn encode(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let clamped = sample.clamp(-1.0, 1.0);
            if clamped < 0.0 {
                (clamped * NEGATIVE_SCALE) as i16
            } else {
                (clamped * POSITIVE_SCALE) as i16
            }
        })
        .collect()
}

/// Convert 16-bit signed integers back to float samples in [-1, 1].
pub fn decode(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| {
            if sample < 0 {
                sample as f32 / NEGATIVE_SCALE
            } else {
                sample as f32 / POSITIVE_SCALE
            }
        })
        .collect()
}

/// Pack samples as little-endian PCM16 bytes.
pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Unpack little-endian PCM16 bytes into samples.
///
/// An odd-length payload cannot be PCM16 and is rejected.
pub fn from_le_bytes(bytes: &[u8]) -> VoiceResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::Decode(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
