// PCM16 decoding for synthesized speech payloads
// Converts base64-encoded little-endian PCM16 into normalized f32 planes

use base64::Engine;

use crate::error::{Error, Result};

/// Sample rate of audio returned by the speech endpoint.
pub const SYNTH_SAMPLE_RATE: u32 = 24000;

/// Decoded audio: one normalized f32 plane per channel.
///
/// Samples are in `[-1.0, 1.0)` — PCM16 is scaled by 1/32768, so the
/// positive end tops out at 32767/32768. All planes have equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    planes: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Get the sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of channels
    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Get the number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.planes.first().map(|p| p.len()).unwrap_or(0)
    }

    /// Get the samples for one channel
    pub fn plane(&self, channel: usize) -> &[f32] {
        &self.planes[channel]
    }

    /// Get all channel planes
    pub fn planes(&self) -> &[Vec<f32>] {
        &self.planes
    }
}

/// Decode a standard-alphabet base64 string to raw bytes.
///
/// No URL-safe variant handling; characters outside the alphabet or a bad
/// padding length fail with [`Error::Decode`].
pub fn decode_base64(blob: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(blob)
        .map_err(|e| Error::Decode(e.to_string()))
}

/// Decode raw bytes as interleaved little-endian PCM16 into channel planes.
///
/// `frames = floor(samples / channels)`; a trailing odd byte or partial
/// frame is silently dropped rather than rejected. Pure transformation:
/// same input always yields a bit-identical buffer.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: usize) -> Result<AudioBuffer> {
    if sample_rate == 0 {
        return Err(Error::InvalidParameter("sample rate must be > 0".to_string()));
    }
    if channels == 0 {
        return Err(Error::InvalidParameter("channel count must be > 0".to_string()));
    }

    // chunks_exact drops a trailing odd byte, matching the truncation policy
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    let frames = samples.len() / channels;

    // 1/32768 is a power of two, so the scaling is exact: -32768 maps to
    // exactly -1.0 and 32767 to 32767/32768. Do not "fix" the asymmetry.
    let scale = 1.0 / 32768.0;

    let mut planes: Vec<Vec<f32>> = (0..channels).map(|_| Vec::with_capacity(frames)).collect();
    for frame in 0..frames {
        for (ch, plane) in planes.iter_mut().enumerate() {
            plane.push(samples[frame * channels + ch] as f32 * scale);
        }
    }

    Ok(AudioBuffer { sample_rate, planes })
}
