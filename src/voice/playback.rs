//! Audio playback to speakers

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tokio::sync::oneshot;

use crate::codec::{decode_wav, encode_wav};
use crate::{Error, Result};

/// Input block size handed to the resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Sample rate of the built-in chime
const CHIME_SAMPLE_RATE: u32 = 24000;

/// Something that can play WAV clips
///
/// Playback runs in the background; the returned [`Playback`] resolves when
/// the clip finishes or is stopped.
pub trait Player: Send + Sync + 'static {
    /// Start playing a WAV clip
    fn play(&self, wav: Vec<u8>) -> Playback;
}

/// Stops an in-flight clip
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request the clip to stop; it then finishes early with `Ok`
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether stop was requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An in-flight clip
pub struct Playback {
    stop: StopHandle,
    done: oneshot::Receiver<Result<()>>,
}

impl Playback {
    /// Pair a stop handle with the receiver the player completes
    #[must_use]
    pub const fn new(stop: StopHandle, done: oneshot::Receiver<Result<()>>) -> Self {
        Self { stop, done }
    }

    /// A playback that has already finished with `result`
    #[must_use]
    pub fn completed(result: Result<()>) -> Self {
        let (tx, done) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            stop: StopHandle::default(),
            done,
        }
    }

    /// Handle that can stop this clip from elsewhere
    #[must_use]
    pub fn stopper(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Wait for the clip to finish
    ///
    /// # Errors
    ///
    /// Returns the decode or device error that ended playback
    pub async fn finished(self) -> Result<()> {
        self.done
            .await
            .map_err(|_| Error::Audio("playback ended without a result".to_string()))?
    }
}

/// Plays clips on the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioPlayback;

impl AudioPlayback {
    /// Create a player for the default output device
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Play raw mono samples
    #[must_use]
    pub fn play_samples(&self, samples: Vec<f32>, sample_rate: u32) -> Playback {
        spawn_playback(move |stop| play_blocking(&samples, sample_rate, stop))
    }
}

impl Player for AudioPlayback {
    fn play(&self, wav: Vec<u8>) -> Playback {
        spawn_playback(move |stop| {
            let audio = decode_wav(&wav)?;
            tracing::debug!(
                sample_rate = audio.sample_rate,
                duration_ms = audio.duration().as_millis(),
                "playing clip"
            );
            play_blocking(&audio.samples, audio.sample_rate, stop)
        })
    }
}

/// Run `job` on a dedicated playback thread
fn spawn_playback<F>(job: F) -> Playback
where
    F: FnOnce(&StopHandle) -> Result<()> + Send + 'static,
{
    let stop = StopHandle::default();
    let (tx, done) = oneshot::channel();
    let thread_stop = stop.clone();

    let spawned = std::thread::Builder::new()
        .name("playback".to_string())
        .spawn(move || {
            let result = job(&thread_stop);
            if let Err(e) = &result {
                tracing::warn!(error = %e, "playback failed");
            }
            let _ = tx.send(result);
        });

    match spawned {
        Ok(_) => Playback::new(stop, done),
        Err(e) => Playback::completed(Err(Error::Audio(format!(
            "failed to spawn playback thread: {e}"
        )))),
    }
}

/// Play samples in a blocking manner
#[allow(clippy::cast_possible_truncation)]
fn play_blocking(samples: &[f32], sample_rate: u32, stop: &StopHandle) -> Result<()> {
    if samples.is_empty() || stop.is_stopped() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let config = output_config(&device, sample_rate)?;
    let device_rate = config.sample_rate.0;
    let channels = usize::from(config.channels).max(1);

    let samples = if device_rate == sample_rate {
        samples.to_vec()
    } else {
        tracing::debug!(from = sample_rate, to = device_rate, "resampling clip");
        resample(samples, sample_rate, device_rate)?
    };

    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        let stop = stop.clone();

        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let halted = stop.is_stopped();
                    let mut pos = position.load(Ordering::Relaxed);

                    for frame in data.chunks_mut(channels) {
                        let sample = match samples.get(pos) {
                            Some(&s) if !halted => {
                                pos += 1;
                                s
                            }
                            _ => {
                                finished.store(true, Ordering::Release);
                                0.0
                            }
                        };
                        frame.fill(sample);
                    }

                    position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    // Poll for completion with timeout
    let duration_ms = (samples.len() as u64 * 1000) / u64::from(device_rate.max(1));
    let timeout = Duration::from_millis(duration_ms + 500);
    let start = Instant::now();

    while !finished.load(Ordering::Acquire) && !stop.is_stopped() {
        if start.elapsed() > timeout {
            tracing::warn!("playback timed out");
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    if !stop.is_stopped() {
        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
    tracing::debug!(
        samples = samples.len(),
        stopped = stop.is_stopped(),
        "playback complete"
    );

    Ok(())
}

/// Pick an output config, preferring one that runs at the clip's own rate
fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
        c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
    };

    let native = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| c.channels() == 1 && supports_rate(c))
        .or_else(|| {
            // Fallback: any channel count
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports_rate(c))
        });

    if let Some(range) = native {
        return Ok(range.with_sample_rate(rate).config());
    }

    device
        .default_output_config()
        .map(|c| c.config())
        .map_err(|e| Error::Audio(format!("no suitable output config found: {e}")))
}

/// Resample mono audio between rates
///
/// # Errors
///
/// Returns [`Error::Audio`] if the resampler rejects the rates
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Audio("cannot resample a zero sample rate".to_string()));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| Error::Audio(e.to_string()))?;
    let resample_err = |e: rubato::ResampleError| Error::Audio(e.to_string());

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected + delay);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in chunks.by_ref() {
        let waves = resampler.process(&[chunk], None).map_err(resample_err)?;
        out.extend(waves.into_iter().flatten());
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let waves = resampler
            .process_partial(Some(&[tail][..]), None)
            .map_err(resample_err)?;
        out.extend(waves.into_iter().flatten());
    }

    // Flush the filter delay
    while out.len() < expected + delay {
        let waves = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(resample_err)?;
        let produced: Vec<f32> = waves.into_iter().flatten().collect();
        if produced.is_empty() {
            break;
        }
        out.extend(produced);
    }

    let end = (delay + expected).min(out.len());
    Ok(out.get(delay..end).map(<[f32]>::to_vec).unwrap_or_default())
}

/// Built-in two tone acknowledgment chime as a WAV clip
///
/// # Errors
///
/// Returns [`Error::Audio`] if the clip cannot be encoded
#[allow(clippy::cast_precision_loss)]
pub fn synthesized_chime() -> Result<Vec<u8>> {
    const TONES: [f32; 2] = [880.0, 1320.0];
    const TONE_SAMPLES: usize = (CHIME_SAMPLE_RATE as usize * 120) / 1000;
    const FADE_SAMPLES: usize = (CHIME_SAMPLE_RATE as usize * 10) / 1000;

    let rate = CHIME_SAMPLE_RATE as f32;
    let mut samples = Vec::with_capacity(TONES.len() * TONE_SAMPLES);

    for freq in TONES {
        for i in 0..TONE_SAMPLES {
            let envelope = if i < FADE_SAMPLES {
                i as f32 / FADE_SAMPLES as f32
            } else if i >= TONE_SAMPLES - FADE_SAMPLES {
                (TONE_SAMPLES - i) as f32 / FADE_SAMPLES as f32
            } else {
                1.0
            };
            let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / rate;
            samples.push(0.3 * envelope * phase.sin());
        }
    }

    encode_wav(&samples, CHIME_SAMPLE_RATE)
}

/// Load the acknowledgment chime, falling back to the built-in one
///
/// # Errors
///
/// Returns [`Error::Audio`] if the built-in chime is needed and cannot be
/// encoded
pub fn load_chime(path: Option<&Path>) -> Result<Vec<u8>> {
    let Some(path) = path else {
        return synthesized_chime();
    };

    match std::fs::read(path) {
        Ok(bytes) => match decode_wav(&bytes) {
            Ok(audio) => {
                tracing::debug!(
                    path = %path.display(),
                    duration_ms = audio.duration().as_millis(),
                    "loaded chime"
                );
                Ok(bytes)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "chime is not a readable WAV, using built-in chime"
                );
                synthesized_chime()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read chime, using built-in chime"
            );
            synthesized_chime()
        }
    }
}
