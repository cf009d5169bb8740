//! Turn-taking states, events and actions

use std::fmt;

use crate::backend::{TurnInput, TurnReply};
use crate::history::LogEntry;
use crate::voice::{ActivationEvent, Utterance};

/// Identifier of one request/response cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnId(pub u64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn-{}", self.0)
    }
}

/// Identifier of one acknowledgment chime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChimeId(pub u64);

/// Where the conversation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Nothing happening
    #[default]
    Idle,
    /// Chime playing after an honored activation
    Acknowledging(ChimeId),
    /// VAD listening for an utterance
    Armed,
    /// Turn sent, waiting for the reply
    Pending {
        turn: TurnId,
        /// Turn was an utterance rather than typed text
        spoken: bool,
    },
    /// Reply audio playing
    Playing(TurnId),
}

impl TurnState {
    /// Short human readable label
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Acknowledging(_) => "acknowledging",
            Self::Armed => "listening",
            Self::Pending { .. } => "thinking",
            Self::Playing(_) => "speaking",
        }
    }

    /// The turn in flight, if any
    #[must_use]
    pub const fn turn(&self) -> Option<TurnId> {
        match self {
            Self::Pending { turn, .. } | Self::Playing(turn) => Some(*turn),
            _ => None,
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Inputs to the turn controller
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Wake word server reported labels
    Activation(ActivationEvent),
    /// Acknowledgment chime ended
    ChimeFinished {
        chime: ChimeId,
        error: Option<String>,
    },
    /// VAD delivered a complete utterance
    Utterance(Utterance),
    /// User submitted text
    TypedText(String),
    /// User turned continuous listening on or off
    SetListening(bool),
    /// Backend answered
    ReplyReceived { turn: TurnId, reply: TurnReply },
    /// Backend call failed
    RequestFailed { turn: TurnId, error: String },
    /// Reply audio ended, possibly with an error
    PlaybackFinished {
        turn: TurnId,
        error: Option<String>,
    },
}

/// Side effects requested by the turn controller, executed in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Play the acknowledgment chime
    PlayChime(ChimeId),
    /// Arm the VAD
    StartVad,
    /// Disarm the VAD
    PauseVad,
    /// Send a turn to the backend
    SendTurn { turn: TurnId, input: TurnInput },
    /// Append to the conversation log
    AppendLog(LogEntry),
    /// Play decoded reply audio
    PlayReply { turn: TurnId, wav: Vec<u8> },
    /// Cut the playing reply short
    StopPlayback,
    /// Tell the user something went wrong
    Report(TurnReport),
}

/// Problems surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnReport {
    /// Typed text arrived while a turn was already pending
    Busy { text: String },
    /// Backend call failed
    RequestFailed { error: String },
    /// Utterance could not be packed into a WAV
    EncodeFailed { error: String },
    /// Reply audio could not be decoded
    DecodeFailed { error: String },
    /// Chime or reply could not be played
    PlaybackFailed { error: String },
}

impl fmt::Display for TurnReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy { text } => write!(f, "still waiting on the last reply, dropped \"{text}\""),
            Self::RequestFailed { error } => write!(f, "request failed: {error}"),
            Self::EncodeFailed { error } => write!(f, "could not encode utterance: {error}"),
            Self::DecodeFailed { error } => write!(f, "could not decode reply audio: {error}"),
            Self::PlaybackFailed { error } => write!(f, "playback failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_in_flight() {
        assert_eq!(TurnState::Idle.turn(), None);
        assert_eq!(TurnState::Armed.turn(), None);
        assert_eq!(
            TurnState::Pending {
                turn: TurnId(3),
                spoken: true
            }
            .turn(),
            Some(TurnId(3))
        );
        assert_eq!(TurnState::Playing(TurnId(4)).turn(), Some(TurnId(4)));
    }

    #[test]
    fn test_display() {
        assert_eq!(TurnId(7).to_string(), "turn-7");
        assert_eq!(TurnState::Armed.to_string(), "listening");
        assert_eq!(
            TurnReport::RequestFailed {
                error: "timeout".to_string()
            }
            .to_string(),
            "request failed: timeout"
        );
    }
}
