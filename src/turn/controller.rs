//! Turn controller
//!
//! A synchronous state machine: every input is an event, every side effect
//! is an [`Action`] for the caller to execute in order. Time is passed in so
//! the activation cooldown can be driven deterministically.

use std::time::{Duration, Instant};

use super::state::{Action, ChimeId, TurnEvent, TurnId, TurnReport, TurnState};
use crate::backend::{TurnInput, TurnReply};
use crate::codec::{decode_base64, encode_base64, encode_wav};
use crate::config::WakeConfig;
use crate::history::LogEntry;
use crate::voice::{ActivationEvent, Utterance};

/// Mediates wake activations, utterances, typed text, backend replies and
/// playback completion into one turn at a time
#[derive(Debug)]
pub struct TurnController {
    activation_label: String,
    cooldown: Duration,
    state: TurnState,
    listening: bool,
    vad_running: bool,
    last_activation: Option<Instant>,
    next_turn: u64,
    next_chime: u64,
}

impl TurnController {
    /// Create an idle controller honoring `activation_label` at most once
    /// per `cooldown`
    #[must_use]
    pub fn new(activation_label: impl Into<String>, cooldown: Duration) -> Self {
        Self {
            activation_label: activation_label.into(),
            cooldown,
            state: TurnState::Idle,
            listening: false,
            vad_running: false,
            last_activation: None,
            next_turn: 1,
            next_chime: 1,
        }
    }

    /// Create a controller from wake channel settings
    #[must_use]
    pub fn from_config(config: &WakeConfig) -> Self {
        Self::new(config.activation_label.clone(), config.cooldown)
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    /// Whether the VAD should re-arm once the current turn settles
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Whether the controller believes the VAD is armed
    #[must_use]
    pub const fn is_vad_running(&self) -> bool {
        self.vad_running
    }

    /// Apply one event and return the actions it requires
    pub fn handle(&mut self, event: TurnEvent, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        let before = self.state;

        match event {
            TurnEvent::Activation(activation) => self.on_activation(&activation, now, &mut actions),
            TurnEvent::ChimeFinished { chime, error } => {
                self.on_chime_finished(chime, error, &mut actions);
            }
            TurnEvent::Utterance(utterance) => self.on_utterance(&utterance, &mut actions),
            TurnEvent::TypedText(text) => self.on_typed_text(text, &mut actions),
            TurnEvent::SetListening(on) => self.on_set_listening(on, &mut actions),
            TurnEvent::ReplyReceived { turn, reply } => self.on_reply(turn, &reply, &mut actions),
            TurnEvent::RequestFailed { turn, error } => {
                self.on_request_failed(turn, error, &mut actions);
            }
            TurnEvent::PlaybackFinished { turn, error } => {
                self.on_playback_finished(turn, error, &mut actions);
            }
        }

        if before != self.state {
            tracing::debug!(from = %before, to = %self.state, "turn state changed");
        }
        actions
    }

    fn on_activation(&mut self, activation: &ActivationEvent, now: Instant, actions: &mut Vec<Action>) {
        if !activation.contains(&self.activation_label) {
            tracing::trace!(label = %self.activation_label, "activation without wake label");
            return;
        }

        if matches!(self.state, TurnState::Acknowledging(_)) {
            tracing::debug!("activation ignored while acknowledging");
            return;
        }

        let elapsed = self
            .last_activation
            .is_none_or(|last| now.saturating_duration_since(last) > self.cooldown);
        if !elapsed {
            tracing::debug!(cooldown_ms = self.cooldown.as_millis(), "activation within cooldown");
            return;
        }

        self.last_activation = Some(now);
        self.listening = true;

        match self.state {
            TurnState::Idle | TurnState::Armed => {
                self.pause_vad(actions);
                let chime = ChimeId(self.next_chime);
                self.next_chime += 1;
                self.state = TurnState::Acknowledging(chime);
                tracing::info!("wake word activation");
                actions.push(Action::PlayChime(chime));
            }
            TurnState::Pending { .. } | TurnState::Playing(_) => {
                tracing::info!("wake word activation, listening after this turn");
            }
            TurnState::Acknowledging(_) => {}
        }
    }

    fn on_chime_finished(&mut self, chime: ChimeId, error: Option<String>, actions: &mut Vec<Action>) {
        if self.state != TurnState::Acknowledging(chime) {
            tracing::trace!("stale chime completion");
            return;
        }

        if let Some(error) = error {
            actions.push(Action::Report(TurnReport::PlaybackFailed { error }));
        }
        self.settle(actions);
    }

    fn on_utterance(&mut self, utterance: &Utterance, actions: &mut Vec<Action>) {
        if self.state != TurnState::Armed {
            tracing::debug!(state = %self.state, "utterance outside listening, dropped");
            return;
        }
        if utterance.samples().is_empty() {
            return;
        }

        self.pause_vad(actions);
        self.listening = false;

        let wav = match encode_wav(utterance.samples(), utterance.sample_rate()) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "utterance could not be encoded");
                actions.push(Action::Report(TurnReport::EncodeFailed {
                    error: e.to_string(),
                }));
                self.abort();
                return;
            }
        };
        let turn = self.begin_turn(true);
        tracing::info!(
            %turn,
            duration_ms = utterance.duration().as_millis(),
            "sending utterance"
        );
        actions.push(Action::SendTurn {
            turn,
            input: TurnInput::Audio(encode_base64(&wav)),
        });
    }

    fn on_typed_text(&mut self, text: String, actions: &mut Vec<Action>) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        match self.state {
            TurnState::Pending { turn, .. } => {
                tracing::debug!(%turn, "typed text while pending, rejected");
                actions.push(Action::Report(TurnReport::Busy { text }));
                return;
            }
            TurnState::Playing(turn) => {
                tracing::debug!(%turn, "typed text supersedes reply");
                actions.push(Action::StopPlayback);
            }
            _ => {}
        }

        self.pause_vad(actions);
        actions.push(Action::AppendLog(LogEntry::user(text.clone())));

        let turn = self.begin_turn(false);
        tracing::info!(%turn, "sending typed text");
        actions.push(Action::SendTurn {
            turn,
            input: TurnInput::Text(text),
        });
    }

    fn on_set_listening(&mut self, on: bool, actions: &mut Vec<Action>) {
        self.listening = on;
        tracing::info!(listening = on, "listening toggled");

        match (on, self.state) {
            (true, TurnState::Idle) => {
                self.start_vad(actions);
                self.state = TurnState::Armed;
            }
            (false, TurnState::Armed) => {
                self.pause_vad(actions);
                self.state = TurnState::Idle;
            }
            _ => {}
        }
    }

    fn on_reply(&mut self, turn: TurnId, reply: &TurnReply, actions: &mut Vec<Action>) {
        let TurnState::Pending { turn: pending, spoken } = self.state else {
            tracing::debug!(%turn, "reply with no pending turn, ignored");
            return;
        };
        if pending != turn {
            tracing::debug!(%turn, %pending, "stale reply ignored");
            return;
        }

        if spoken && let Some(heard) = reply.heard() {
            actions.push(Action::AppendLog(LogEntry::user(heard)));
        }
        actions.push(Action::AppendLog(LogEntry::ai(reply.response_text())));

        let Some(audio) = reply.audio() else {
            tracing::debug!(%turn, "reply without audio");
            self.settle(actions);
            return;
        };

        match decode_base64(audio) {
            Ok(wav) => {
                self.state = TurnState::Playing(turn);
                actions.push(Action::PlayReply { turn, wav });
            }
            Err(e) => {
                tracing::warn!(%turn, error = %e, "reply audio undecodable");
                actions.push(Action::Report(TurnReport::DecodeFailed {
                    error: e.to_string(),
                }));
                self.abort();
            }
        }
    }

    fn on_request_failed(&mut self, turn: TurnId, error: String, actions: &mut Vec<Action>) {
        if !matches!(self.state, TurnState::Pending { turn: pending, .. } if pending == turn) {
            tracing::debug!(%turn, "stale request failure ignored");
            return;
        }

        tracing::warn!(%turn, %error, "turn failed");
        actions.push(Action::Report(TurnReport::RequestFailed { error }));
        self.abort();
    }

    fn on_playback_finished(&mut self, turn: TurnId, error: Option<String>, actions: &mut Vec<Action>) {
        if self.state != TurnState::Playing(turn) {
            tracing::trace!(%turn, "stale playback completion");
            return;
        }

        if let Some(error) = error {
            actions.push(Action::Report(TurnReport::PlaybackFailed { error }));
        }
        self.settle(actions);
    }

    fn begin_turn(&mut self, spoken: bool) -> TurnId {
        let turn = TurnId(self.next_turn);
        self.next_turn += 1;
        self.state = TurnState::Pending { turn, spoken };
        turn
    }

    /// Leave the current phase: re-arm if listening, otherwise idle
    fn settle(&mut self, actions: &mut Vec<Action>) {
        if self.listening {
            self.start_vad(actions);
            self.state = TurnState::Armed;
        } else {
            self.state = TurnState::Idle;
        }
    }

    /// Drop the current turn after a failure
    fn abort(&mut self) {
        self.listening = false;
        self.state = TurnState::Idle;
    }

    fn start_vad(&mut self, actions: &mut Vec<Action>) {
        if !self.vad_running {
            self.vad_running = true;
            actions.push(Action::StartVad);
        }
    }

    fn pause_vad(&mut self, actions: &mut Vec<Action>) {
        if self.vad_running {
            self.vad_running = false;
            actions.push(Action::PauseVad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &str = "hey_neon_high";

    fn controller() -> TurnController {
        TurnController::new(LABEL, Duration::from_millis(3000))
    }

    fn wake() -> TurnEvent {
        TurnEvent::Activation(ActivationEvent::new([LABEL]))
    }

    fn speech() -> TurnEvent {
        TurnEvent::Utterance(Utterance::new(vec![0.1; 1600], 16000))
    }

    fn chime_of(actions: &[Action]) -> ChimeId {
        actions
            .iter()
            .find_map(|a| match a {
                Action::PlayChime(id) => Some(*id),
                _ => None,
            })
            .expect("chime played")
    }

    fn sent_turn(actions: &[Action]) -> TurnId {
        actions
            .iter()
            .find_map(|a| match a {
                Action::SendTurn { turn, .. } => Some(*turn),
                _ => None,
            })
            .expect("turn sent")
    }

    /// Drive a controller from idle to armed
    fn armed(c: &mut TurnController, now: Instant) {
        let actions = c.handle(wake(), now);
        let chime = chime_of(&actions);
        let actions = c.handle(TurnEvent::ChimeFinished { chime, error: None }, now);
        assert_eq!(actions, vec![Action::StartVad]);
        assert_eq!(c.state(), TurnState::Armed);
    }

    #[test]
    fn test_activation_needs_label() {
        let mut c = controller();
        let actions = c.handle(
            TurnEvent::Activation(ActivationEvent::new(["hey_neon_low"])),
            Instant::now(),
        );
        assert!(actions.is_empty());
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn test_chime_then_armed() {
        let mut c = controller();
        let now = Instant::now();
        let actions = c.handle(wake(), now);
        assert!(matches!(actions.as_slice(), [Action::PlayChime(_)]));
        assert!(c.is_listening());
        assert!(!c.is_vad_running());

        let chime = chime_of(&actions);
        c.handle(TurnEvent::ChimeFinished { chime, error: None }, now);
        assert_eq!(c.state(), TurnState::Armed);
        assert!(c.is_vad_running());
    }

    #[test]
    fn test_listening_off_during_chime_goes_idle() {
        let mut c = controller();
        let now = Instant::now();
        let chime = chime_of(&c.handle(wake(), now));
        c.handle(TurnEvent::SetListening(false), now);

        let actions = c.handle(TurnEvent::ChimeFinished { chime, error: None }, now);
        assert!(actions.is_empty());
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn test_utterance_sends_audio_turn() {
        let mut c = controller();
        let now = Instant::now();
        armed(&mut c, now);

        let actions = c.handle(speech(), now);
        assert_eq!(actions[0], Action::PauseVad);
        let Action::SendTurn {
            input: TurnInput::Audio(b64),
            ..
        } = &actions[1]
        else {
            panic!("expected audio turn");
        };
        let wav = decode_base64(b64).unwrap();
        assert_eq!(wav.len(), 44 + 2 * 1600);
        assert!(!c.is_listening());
        assert!(matches!(c.state(), TurnState::Pending { spoken: true, .. }));
    }

    #[test]
    fn test_utterance_when_not_armed_is_dropped() {
        let mut c = controller();
        assert!(c.handle(speech(), Instant::now()).is_empty());
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn test_spoken_reply_logs_heard_text_first() {
        let mut c = controller();
        let now = Instant::now();
        armed(&mut c, now);
        let turn = sent_turn(&c.handle(speech(), now));

        let reply = TurnReply {
            transcription: "It is noon".to_string(),
            utterance: Some("what time is it".to_string()),
            audio_output: Some(encode_base64(&encode_wav(&[0.0; 10], 16000).unwrap())),
            session_id: None,
        };
        let actions = c.handle(TurnEvent::ReplyReceived { turn, reply }, now);

        assert_eq!(actions[0], Action::AppendLog(LogEntry::user("what time is it")));
        assert_eq!(actions[1], Action::AppendLog(LogEntry::ai("It is noon")));
        assert!(matches!(actions[2], Action::PlayReply { .. }));
        assert_eq!(c.state(), TurnState::Playing(turn));
    }

    #[test]
    fn test_playback_end_idles_without_listening() {
        let mut c = controller();
        let now = Instant::now();
        armed(&mut c, now);
        let turn = sent_turn(&c.handle(speech(), now));
        c.handle(
            TurnEvent::ReplyReceived {
                turn,
                reply: TurnReply {
                    transcription: "ok".to_string(),
                    audio_output: Some(encode_base64(b"RIFF")),
                    ..TurnReply::default()
                },
            },
            now,
        );

        let actions = c.handle(TurnEvent::PlaybackFinished { turn, error: None }, now);
        assert!(actions.is_empty());
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn test_playback_end_rearms_when_listening() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(TurnEvent::SetListening(true), now);
        let turn = sent_turn(&c.handle(TurnEvent::TypedText("hi".to_string()), now));
        c.handle(
            TurnEvent::ReplyReceived {
                turn,
                reply: TurnReply {
                    transcription: "hello".to_string(),
                    audio_output: Some(encode_base64(b"RIFF")),
                    ..TurnReply::default()
                },
            },
            now,
        );

        let actions = c.handle(
            TurnEvent::PlaybackFinished {
                turn,
                error: Some("device gone".to_string()),
            },
            now,
        );
        assert_eq!(
            actions,
            vec![
                Action::Report(TurnReport::PlaybackFailed {
                    error: "device gone".to_string()
                }),
                Action::StartVad
            ]
        );
        assert_eq!(c.state(), TurnState::Armed);
    }

    #[test]
    fn test_reply_without_audio_settles() {
        let mut c = controller();
        let now = Instant::now();
        let turn = sent_turn(&c.handle(TurnEvent::TypedText("hello".to_string()), now));
        let actions = c.handle(
            TurnEvent::ReplyReceived {
                turn,
                reply: TurnReply {
                    transcription: "hi there".to_string(),
                    audio_output: Some(String::new()),
                    ..TurnReply::default()
                },
            },
            now,
        );
        assert_eq!(actions, vec![Action::AppendLog(LogEntry::ai("hi there"))]);
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn test_bad_reply_audio_aborts_turn() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(TurnEvent::SetListening(true), now);
        let turn = sent_turn(&c.handle(TurnEvent::TypedText("hello".to_string()), now));
        let actions = c.handle(
            TurnEvent::ReplyReceived {
                turn,
                reply: TurnReply {
                    transcription: "hi".to_string(),
                    audio_output: Some("%%%".to_string()),
                    ..TurnReply::default()
                },
            },
            now,
        );
        assert!(matches!(
            actions.last(),
            Some(Action::Report(TurnReport::DecodeFailed { .. }))
        ));
        assert_eq!(c.state(), TurnState::Idle);
        assert!(!c.is_listening());
    }

    #[test]
    fn test_request_failure_idles() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(TurnEvent::SetListening(true), now);
        let turn = sent_turn(&c.handle(TurnEvent::TypedText("hello".to_string()), now));

        let actions = c.handle(
            TurnEvent::RequestFailed {
                turn,
                error: "connection refused".to_string(),
            },
            now,
        );
        assert_eq!(
            actions,
            vec![Action::Report(TurnReport::RequestFailed {
                error: "connection refused".to_string()
            })]
        );
        assert_eq!(c.state(), TurnState::Idle);
        assert!(!c.is_listening());
        assert!(!c.is_vad_running());
    }

    #[test]
    fn test_typed_text_while_pending_rejected() {
        let mut c = controller();
        let now = Instant::now();
        let first = sent_turn(&c.handle(TurnEvent::TypedText("one".to_string()), now));

        let actions = c.handle(TurnEvent::TypedText("two".to_string()), now);
        assert_eq!(
            actions,
            vec![Action::Report(TurnReport::Busy {
                text: "two".to_string()
            })]
        );
        assert_eq!(c.state().turn(), Some(first));
    }

    #[test]
    fn test_typed_text_stops_playback() {
        let mut c = controller();
        let now = Instant::now();
        let first = sent_turn(&c.handle(TurnEvent::TypedText("one".to_string()), now));
        c.handle(
            TurnEvent::ReplyReceived {
                turn: first,
                reply: TurnReply {
                    transcription: "reply".to_string(),
                    audio_output: Some(encode_base64(b"RIFF")),
                    ..TurnReply::default()
                },
            },
            now,
        );

        let actions = c.handle(TurnEvent::TypedText("two".to_string()), now);
        assert_eq!(actions[0], Action::StopPlayback);
        let second = sent_turn(&actions);
        assert_ne!(first, second);

        // Completion of the superseded reply is stale
        assert!(
            c.handle(TurnEvent::PlaybackFinished { turn: first, error: None }, now)
                .is_empty()
        );
        assert_eq!(c.state().turn(), Some(second));
    }

    #[test]
    fn test_typed_text_pauses_vad() {
        let mut c = controller();
        let now = Instant::now();
        armed(&mut c, now);

        let actions = c.handle(TurnEvent::TypedText("hello".to_string()), now);
        assert_eq!(actions[0], Action::PauseVad);
        assert_eq!(actions[1], Action::AppendLog(LogEntry::user("hello")));
        assert!(!c.is_vad_running());
    }

    #[test]
    fn test_empty_typed_text_ignored() {
        let mut c = controller();
        assert!(c.handle(TurnEvent::TypedText("   ".to_string()), Instant::now()).is_empty());
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn test_activation_while_armed_replays_chime() {
        let mut c = controller();
        let start = Instant::now();
        armed(&mut c, start);

        let actions = c.handle(wake(), start + Duration::from_millis(3001));
        assert_eq!(actions[0], Action::PauseVad);
        assert!(matches!(actions[1], Action::PlayChime(_)));
    }

    #[test]
    fn test_activation_while_pending_sets_listening() {
        let mut c = controller();
        let start = Instant::now();
        let turn = sent_turn(&c.handle(TurnEvent::TypedText("hi".to_string()), start));

        assert!(c.handle(wake(), start).is_empty());
        assert!(c.is_listening());

        let actions = c.handle(
            TurnEvent::ReplyReceived {
                turn,
                reply: TurnReply {
                    transcription: "hello".to_string(),
                    ..TurnReply::default()
                },
            },
            start,
        );
        assert_eq!(actions.last(), Some(&Action::StartVad));
        assert_eq!(c.state(), TurnState::Armed);
    }

    #[test]
    fn test_stale_chime_ignored() {
        let mut c = controller();
        let now = Instant::now();
        let chime = chime_of(&c.handle(wake(), now));
        c.handle(TurnEvent::TypedText("hi".to_string()), now);

        assert!(c.handle(TurnEvent::ChimeFinished { chime, error: None }, now).is_empty());
        assert!(matches!(c.state(), TurnState::Pending { .. }));
    }

    #[test]
    fn test_listening_toggle() {
        let mut c = controller();
        let now = Instant::now();
        assert_eq!(c.handle(TurnEvent::SetListening(true), now), vec![Action::StartVad]);
        assert_eq!(c.state(), TurnState::Armed);
        assert_eq!(c.handle(TurnEvent::SetListening(false), now), vec![Action::PauseVad]);
        assert_eq!(c.state(), TurnState::Idle);
    }
}
