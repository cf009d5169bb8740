//! Voice activity detection
//!
//! Segments a continuous microphone feed into utterances using block RMS
//! energy. The [`VadChannel`] wraps a [`SpeechSegmenter`] with start/pause
//! control and hands finished utterances to a registered channel.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;

/// Tuning for the energy based speech segmenter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    /// RMS energy above which a block counts as speech
    pub energy_threshold: f32,
    /// Voiced audio required before an utterance is accepted
    pub min_speech_ms: u32,
    /// Trailing silence that ends an utterance
    pub silence_ms: u32,
    /// Audio kept from before speech onset
    pub pre_speech_ms: u32,
    /// Utterances are closed once they reach this length
    pub max_utterance_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.03,
            min_speech_ms: 300,
            silence_ms: 500,
            pre_speech_ms: 300,
            max_utterance_ms: 30_000,
        }
    }
}

/// A complete utterance bounded by detected speech start and end
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Utterance {
    /// Create an utterance from mono float samples
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Mono float samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate the utterance was captured at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the utterance
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Silence,
    /// Speech detected, accumulating until trailing silence
    Speaking,
}

/// Energy based speech segmenter
pub struct SpeechSegmenter {
    threshold: f32,
    min_speech: usize,
    silence_span: usize,
    pre_speech: usize,
    max_utterance: usize,
    state: SegmenterState,
    pre_roll: VecDeque<f32>,
    speech: Vec<f32>,
    voiced: usize,
    silence_counter: usize,
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    usize::try_from(u64::from(ms) * u64::from(sample_rate) / 1000).unwrap_or(usize::MAX)
}

impl SpeechSegmenter {
    /// Create a segmenter for audio at `sample_rate`
    #[must_use]
    pub fn new(config: VadConfig, sample_rate: u32) -> Self {
        Self {
            threshold: config.energy_threshold,
            min_speech: ms_to_samples(config.min_speech_ms, sample_rate),
            silence_span: ms_to_samples(config.silence_ms, sample_rate),
            pre_speech: ms_to_samples(config.pre_speech_ms, sample_rate),
            max_utterance: ms_to_samples(config.max_utterance_ms, sample_rate).max(1),
            state: SegmenterState::Silence,
            pre_roll: VecDeque::new(),
            speech: Vec::new(),
            voiced: 0,
            silence_counter: 0,
        }
    }

    /// Process a block of samples
    ///
    /// Returns the utterance samples when speech has ended (or hit the
    /// maximum length); the segmenter is back in [`SegmenterState::Silence`]
    /// afterwards.
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        let energy = rms_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            SegmenterState::Silence => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.speech.clear();
                    self.speech.extend(self.pre_roll.drain(..));
                    self.speech.extend_from_slice(samples);
                    self.voiced = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech onset");
                } else {
                    self.pre_roll.extend(samples.iter().copied());
                    let excess = self.pre_roll.len().saturating_sub(self.pre_speech);
                    self.pre_roll.drain(..excess);
                }
                None
            }
            SegmenterState::Speaking => {
                self.speech.extend_from_slice(samples);

                if is_speech {
                    self.voiced += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.speech.len() >= self.max_utterance {
                    tracing::debug!(samples = self.speech.len(), "utterance reached maximum length");
                    return Some(self.finish());
                }

                if self.silence_counter > self.silence_span && self.voiced >= self.min_speech {
                    tracing::debug!(
                        samples = self.speech.len(),
                        voiced = self.voiced,
                        "speech segment complete"
                    );
                    return Some(self.finish());
                }

                // Too much silence without enough speech
                if self.silence_counter > self.silence_span * 2 {
                    tracing::trace!(voiced = self.voiced, "speech too short, discarding");
                    self.reset();
                }

                None
            }
        }
    }

    fn finish(&mut self) -> Vec<f32> {
        let speech = std::mem::take(&mut self.speech);
        self.reset();
        speech
    }

    /// Drop any partial speech and return to silence
    pub fn reset(&mut self) {
        self.state = SegmenterState::Silence;
        self.pre_roll.clear();
        self.speech.clear();
        self.voiced = 0;
        self.silence_counter = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }
}

/// Speech-boundary detector with start/pause control
///
/// Each arm yields at most one utterance: after delivering it the channel
/// disarms itself and must be started again.
pub struct VadChannel {
    config: VadConfig,
    segmenter: Option<(u32, SpeechSegmenter)>,
    running: bool,
    handler: mpsc::UnboundedSender<Utterance>,
}

impl VadChannel {
    /// Create a paused VAD channel delivering utterances to `handler`
    #[must_use]
    pub const fn new(config: VadConfig, handler: mpsc::UnboundedSender<Utterance>) -> Self {
        Self {
            config,
            segmenter: None,
            running: false,
            handler,
        }
    }

    /// Arm continuous listening
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        tracing::debug!("vad started");
    }

    /// Disarm listening, discarding partial speech
    pub fn pause(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some((_, segmenter)) = self.segmenter.as_mut() {
            segmenter.reset();
        }
        tracing::debug!("vad paused");
    }

    /// Whether the channel is armed
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Feed microphone samples; ignored while paused
    pub fn feed(&mut self, samples: &[f32], sample_rate: u32) {
        if !self.running || sample_rate == 0 {
            return;
        }

        if !matches!(self.segmenter, Some((rate, _)) if rate == sample_rate) {
            self.segmenter = Some((sample_rate, SpeechSegmenter::new(self.config, sample_rate)));
        }
        let Some((_, segmenter)) = self.segmenter.as_mut() else {
            return;
        };

        if let Some(speech) = segmenter.process(samples) {
            self.running = false;
            let utterance = Utterance::new(speech, sample_rate);
            tracing::info!(duration_ms = utterance.duration().as_millis(), "utterance detected");
            if self.handler.send(utterance).is_err() {
                tracing::warn!("utterance handler gone, dropping utterance");
            }
        }
    }
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
