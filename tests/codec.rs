//! Wire codec integration tests

use std::io::Cursor;

use beacon_satellite::Error;
use beacon_satellite::codec::{
    DATA_URL_PREFIX, Pcm16Scaling, WAV_HEADER_LEN, decode_base64, decode_wav, encode_base64,
    encode_wav, float_to_pcm16, pcm16_to_le_bytes,
};

mod common;

#[test]
fn test_two_seconds_of_silence() {
    let rate = 16000;
    let wav = encode_wav(&common::silence(2.0, rate), rate).unwrap();

    let data_len = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
    assert_eq!(data_len, rate * 2 * 2);
    assert_eq!(wav.len(), WAV_HEADER_LEN + data_len as usize);
    assert!(wav[WAV_HEADER_LEN..].iter().all(|&b| b == 0));

    // A standard reader agrees
    let mut reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, rate);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(samples.len(), 32000);
    assert!(samples.iter().all(|&s| s == 0));
}

#[test]
fn test_wav_length_tracks_sample_count() {
    for (len, rate) in [(0, 8000), (1, 16000), (4096, 44100), (48000, 48000)] {
        let wav = encode_wav(&vec![0.25; len], rate).unwrap();
        assert_eq!(wav.len(), 44 + 2 * len);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), rate);
        assert_eq!(u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]), rate * 2);
    }
}

#[test]
fn test_wav_through_base64_and_back() {
    let tone = common::tone(440.0, 0.25, 0.5, 22050);
    let wav = encode_wav(&tone, 22050).unwrap();

    let text = format!("{DATA_URL_PREFIX}{}", encode_base64(&wav));
    let bytes = decode_base64(&text).unwrap();
    assert_eq!(bytes, wav);

    let decoded = decode_wav(&bytes).unwrap();
    assert_eq!(decoded.sample_rate, 22050);
    assert_eq!(decoded.samples.len(), tone.len());
    let max_err = decoded
        .samples
        .iter()
        .zip(&tone)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    assert!(max_err < 1e-3, "max error {max_err}");
}

#[test]
fn test_base64_round_trip() {
    let payloads: [&[u8]; 4] = [b"", b"a", b"RIFF\x00\xff\x10", &[0xAB; 1000]];
    for bytes in payloads {
        assert_eq!(decode_base64(&encode_base64(bytes)).unwrap(), bytes);
    }
}

#[test]
fn test_malformed_base64() {
    assert!(matches!(decode_base64("not base64!"), Err(Error::Decode(_))));
}

#[test]
fn test_streaming_and_wav_scaling_differ_only_for_negatives() {
    let samples = [-1.0, -0.5, 0.0, 0.5, 1.0, 2.0, -2.0];
    let streamed = float_to_pcm16(&samples, Pcm16Scaling::Symmetric);
    let stored = float_to_pcm16(&samples, Pcm16Scaling::Asymmetric);

    assert_eq!(streamed, vec![-32767, -16383, 0, 16383, 32767, 32767, -32767]);
    assert_eq!(stored, vec![-32768, -16384, 0, 16383, 32767, 32767, -32768]);
    assert_eq!(pcm16_to_le_bytes(&[-32768]), vec![0x00, 0x80]);
}
