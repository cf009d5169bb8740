//! Beacon Satellite - voice front end for a conversational assistant
//!
//! This library provides the pieces of a voice satellite:
//! - PCM, WAV and base64 codecs for the wire
//! - Microphone capture, wake word streaming, voice activity detection
//! - A turn controller that keeps one conversation turn in flight
//! - Reply playback and a local conversation log
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Microphone            Terminal              │
//! │     frames │    │ samples         │ typed text       │
//! └────────────┼────┼─────────────────┼──────────────────┘
//!              │    │                 │
//! ┌────────────▼┐ ┌─▼───┐             │
//! │ Wake channel│ │ VAD │             │
//! └──────┬──────┘ └──┬──┘             │
//!        │activation │utterance       │
//! ┌──────▼───────────▼────────────────▼──────────────────┐
//! │                 Turn controller                      │
//! │  Idle → Acknowledging → Armed → Pending → Playing    │
//! └──────┬──────────────────────┬────────────────────────┘
//!        │ POST /user_input     │ reply audio
//! ┌──────▼──────┐        ┌──────▼──────┐
//! │   Backend   │        │   Player    │
//! └─────────────┘        └─────────────┘
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod console;
pub mod error;
pub mod history;
pub mod satellite;
pub mod turn;
pub mod voice;

pub use backend::{Backend, HttpBackend, TurnInput, TurnReply};
pub use config::Config;
pub use error::{Error, Result};
pub use history::{ConversationLog, JsonFileLog, LogEntry, MemoryLog, Sender};
pub use satellite::{Inputs, Notice, Satellite};
pub use turn::{Action, TurnController, TurnEvent, TurnId, TurnReport, TurnState};
