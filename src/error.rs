//! Error types for the Beacon satellite

use thiserror::Error;

/// Result type alias for satellite operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the satellite
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone unavailable, permission denied or stream failure
    #[error("capture error: {0}")]
    Capture(String),

    /// Wake channel connection or send failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Conversation backend call failed or returned a non-success status
    #[error("request error: {0}")]
    Request(String),

    /// Malformed base64, WAV or reply payload
    #[error("decode error: {0}")]
    Decode(String),

    /// Audio output error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
