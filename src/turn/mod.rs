//! Conversational turn-taking
//!
//! The controller decides; the satellite runtime executes.

mod controller;
mod state;

pub use controller::TurnController;
pub use state::{Action, ChimeId, TurnEvent, TurnId, TurnReport, TurnState};
