//! Audio capture from microphone

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::codec::{Pcm16Scaling, float_to_pcm16, pcm16_to_le_bytes};
use crate::config::CaptureConfig;
use crate::{Error, Result};

/// A mono block of 16-bit PCM samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Frames are always mono
    pub const CHANNELS: u16 = 1;

    /// Create a frame from PCM16 samples
    #[must_use]
    pub const fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// PCM16 samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Little-endian payload as sent over the wire
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        pcm16_to_le_bytes(&self.samples)
    }

    /// Length of audio in the frame
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Cuts an arbitrary stream of float samples into fixed-size PCM16 frames
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl FrameAssembler {
    /// Create an assembler emitting `frame_size` samples per frame
    #[must_use]
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            sample_rate,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Append samples, returning every frame completed by them in order
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.frame_size * self.frame_size;
        if complete == 0 {
            return Vec::new();
        }

        let frames = self.pending[..complete]
            .chunks_exact(self.frame_size)
            .map(|chunk| {
                AudioFrame::new(
                    float_to_pcm16(chunk, Pcm16Scaling::Symmetric),
                    self.sample_rate,
                )
            })
            .collect();
        self.pending.drain(..complete);
        frames
    }

    /// Samples waiting for the next frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Receivers fed by a running capture stream
pub struct CaptureStreams {
    /// Hardware sample rate discovered at start
    pub sample_rate: u32,
    /// Fixed-size PCM16 frames in production order
    pub frames: mpsc::UnboundedReceiver<AudioFrame>,
    /// Raw mono float blocks as delivered by the device
    pub samples: mpsc::UnboundedReceiver<Vec<f32>>,
}

/// Captures audio from the default input device
pub struct AudioCapture {
    frame_size: usize,
    stream: Option<Stream>,
    sample_rate: Option<u32>,
}

impl AudioCapture {
    /// Create an inactive capture channel
    #[must_use]
    pub const fn new(config: CaptureConfig) -> Self {
        Self {
            frame_size: config.frame_size,
            stream: None,
            sample_rate: None,
        }
    }

    /// Open the microphone and start streaming
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if capture is already running, no input
    /// device is available, or the stream cannot be built
    pub fn start(&mut self) -> Result<CaptureStreams> {
        if self.stream.is_some() {
            return Err(Error::Capture("capture already running".to_string()));
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Capture("no input device available".to_string()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| Error::Capture(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();

        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (samples_tx, samples) = mpsc::unbounded_channel();
        let taps = Taps {
            frames: frames_tx,
            samples: samples_tx,
            frame_size: self.frame_size,
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_input::<f32>(&device, &config, taps),
            SampleFormat::I16 => build_input::<i16>(&device, &config, taps),
            SampleFormat::U16 => build_input::<u16>(&device, &config, taps),
            SampleFormat::I32 => build_input::<i32>(&device, &config, taps),
            other => Err(Error::Capture(format!("unsupported sample format {other}"))),
        }?;

        stream.play().map_err(|e| Error::Capture(e.to_string()))?;

        let sample_rate = config.sample_rate.0;
        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            frame_size = self.frame_size,
            "audio capture started"
        );

        self.stream = Some(stream);
        self.sample_rate = Some(sample_rate);

        Ok(CaptureStreams {
            sample_rate,
            frames,
            samples,
        })
    }

    /// Stop capturing audio; no-op when not started
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.sample_rate = None;
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Hardware sample rate, known only while capturing
    #[must_use]
    pub const fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }
}

struct Taps {
    frames: mpsc::UnboundedSender<AudioFrame>,
    samples: mpsc::UnboundedSender<Vec<f32>>,
    frame_size: usize,
}

fn build_input<T>(device: &Device, config: &StreamConfig, taps: Taps) -> Result<Stream>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = usize::from(config.channels).max(1);
    let mut assembler = FrameAssembler::new(taps.frame_size, config.sample_rate.0);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // First channel only
                let mono: Vec<f32> = data
                    .iter()
                    .step_by(channels)
                    .map(|s| s.to_sample::<f32>())
                    .collect();

                for frame in assembler.push(&mono) {
                    // Receiver gone means the satellite is shutting down
                    let _ = taps.frames.send(frame);
                }
                let _ = taps.samples.send(mono);
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Capture(e.to_string()))
}
