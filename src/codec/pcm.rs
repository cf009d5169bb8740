//! Float to 16-bit PCM conversion

/// Scale applied to non-negative samples (and to all samples when symmetric)
const POSITIVE_SCALE: f32 = 32767.0;

/// Scale applied to negative samples in the asymmetric mode
const NEGATIVE_SCALE: f32 = 32768.0;

/// How negative samples map onto the i16 range
///
/// The microphone stream uses [`Pcm16Scaling::Symmetric`]; WAV encoding
/// uses [`Pcm16Scaling::Asymmetric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pcm16Scaling {
    /// Every sample scaled by `0x7FFF`; -1.0 maps to -32767
    #[default]
    Symmetric,
    /// Negative samples scaled by `0x8000`, the rest by `0x7FFF`; -1.0 maps to -32768
    Asymmetric,
}

impl Pcm16Scaling {
    /// Convert a single float sample, clamping it to [-1, 1] first
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn convert(self, sample: f32) -> i16 {
        let s = sample.clamp(-1.0, 1.0);
        let scaled = match self {
            Self::Asymmetric if s < 0.0 => s * NEGATIVE_SCALE,
            _ => s * POSITIVE_SCALE,
        };
        // `as` truncates toward zero and maps NaN to 0
        scaled as i16
    }
}

/// Convert float samples in [-1, 1] to signed 16-bit PCM
#[must_use]
pub fn float_to_pcm16(samples: &[f32], scaling: Pcm16Scaling) -> Vec<i16> {
    samples.iter().map(|&s| scaling.convert(s)).collect()
}

/// Serialize PCM16 samples as little-endian bytes
#[must_use]
pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Convert signed 16-bit PCM back to floats in [-1, 1)
#[must_use]
pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / NEGATIVE_SCALE).collect()
}
