//! WAV container encoding and decoding

use std::io::Cursor;

use super::pcm::{Pcm16Scaling, float_to_pcm16};
use crate::{Error, Result};

/// Length of the canonical RIFF/WAVE/fmt/data header
pub const WAV_HEADER_LEN: usize = 44;

/// Encode mono float samples as a 16-bit PCM WAV file
///
/// Negative samples use the asymmetric `0x8000` scale. Output length is
/// always `44 + 2 * samples.len()`.
///
/// # Errors
///
/// Returns [`Error::Audio`] if the container cannot be written
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for sample in float_to_pcm16(samples, Pcm16Scaling::Asymmetric) {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Audio decoded from a WAV container, downmixed to mono
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the source file
    pub channels: u16,
}

impl DecodedAudio {
    /// Playback duration
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Decode a PCM or float WAV file to mono float samples
///
/// # Errors
///
/// Returns [`Error::Decode`] if the bytes are not a readable WAV file
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(Error::Decode("WAV declares zero channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let channels = usize::from(spec.channels);
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    tracing::trace!(
        samples = samples.len(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        "decoded wav"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    #[test]
    fn test_header_fields() {
        let wav = encode_wav(&[0.0; 10], 16000).unwrap();

        assert_eq!(wav.len(), WAV_HEADER_LEN + 20);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + 20);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 16), 16);
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 1);
        assert_eq!(u32_at(&wav, 24), 16000);
        assert_eq!(u32_at(&wav, 28), 32000);
        assert_eq!(u16_at(&wav, 32), 2);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 20);
    }

    #[test]
    fn test_empty_samples() {
        let wav = encode_wav(&[], 44100).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_LEN);
        assert_eq!(u32_at(&wav, 40), 0);
    }

    #[test]
    fn test_payload_uses_asymmetric_scale() {
        let wav = encode_wav(&[-1.0, 1.0], 8000).unwrap();
        assert_eq!(i16::from_le_bytes([wav[44], wav[45]]), -32768);
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), 32767);
    }

    #[test]
    fn test_decode_encoded() {
        let wav = encode_wav(&[0.0, 0.5, -0.5], 22050).unwrap();
        let decoded = decode_wav(&wav).unwrap();

        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), 3);
        assert!((decoded.samples[1] - 0.5).abs() < 1e-3);
        assert!((decoded.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_stereo_downmix() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..4 {
                writer.write_sample(16384_i16).unwrap();
                writer.write_sample(0_i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples.len(), 4);
        assert!(decoded.samples.iter().all(|s| (s - 0.25).abs() < 1e-3));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_wav(b"definitely not a wav"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_duration() {
        let decoded = decode_wav(&encode_wav(&[0.0; 16000], 16000).unwrap()).unwrap();
        assert_eq!(decoded.duration(), std::time::Duration::from_secs(1));
    }
}
