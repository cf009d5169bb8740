//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beacon_satellite::codec::{encode_base64, encode_wav};
use beacon_satellite::voice::{Playback, Player};
use beacon_satellite::{Backend, Error, Result, TurnInput, TurnReply};

/// Backend that records every turn and answers from a script
#[derive(Clone, Default)]
pub struct FakeBackend {
    pub inputs: Arc<Mutex<Vec<TurnInput>>>,
    replies: Arc<Mutex<VecDeque<Result<TurnReply>>>>,
}

impl FakeBackend {
    /// Queue the next answer
    pub fn reply(&self, reply: TurnReply) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(reply));
        self
    }

    /// Queue a failure
    pub fn fail(&self, message: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(Error::Request(message.to_string())));
        self
    }

    pub fn received(&self) -> Vec<TurnInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn converse(&self, input: TurnInput) -> Result<TurnReply> {
        self.inputs.lock().unwrap().push(input);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Request("no scripted reply".to_string())))
    }
}

/// Player that records clips and finishes them immediately
#[derive(Clone, Default)]
pub struct FakePlayer {
    pub clips: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FakePlayer {
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.clips.lock().unwrap().clone()
    }
}

impl Player for FakePlayer {
    fn play(&self, wav: Vec<u8>) -> Playback {
        self.clips.lock().unwrap().push(wav);
        Playback::completed(Ok(()))
    }
}

/// Mono silence at `sample_rate`
pub fn silence(duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let len = (sample_rate as f32 * duration_secs) as usize;
    vec![0.0; len]
}

/// Sine tone at `sample_rate`
pub fn tone(frequency: f32, duration_secs: f32, amplitude: f32, sample_rate: u32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let len = (sample_rate as f32 * duration_secs) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Base64 WAV of a short silent reply
pub fn reply_audio() -> String {
    encode_base64(&encode_wav(&silence(0.1, 16000), 16000).unwrap())
}
