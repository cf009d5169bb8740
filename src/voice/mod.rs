//! Voice processing module
//!
//! Handles microphone capture, the wake word connection, voice activity
//! detection, and playback of chimes and replies.

mod capture;
mod playback;
mod vad;
mod wake;

pub use capture::{AudioCapture, AudioFrame, CaptureStreams, FrameAssembler};
pub use playback::{
    AudioPlayback, Playback, Player, StopHandle, load_chime, resample, synthesized_chime,
};
pub use vad::{
    SegmenterState, SpeechSegmenter, Utterance, VadChannel, VadConfig, rms_energy,
};
pub use wake::{ActivationEvent, WakeChannel, WakeMessage, parse_message};
