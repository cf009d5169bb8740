//! Conversation backend client
//!
//! One request per turn: either typed text or a base64 WAV of the spoken
//! utterance goes to `POST {url}/user_input`, and the reply carries the
//! assistant text, what was heard, and optionally synthesized audio.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::{Error, Result};

/// What the user submitted for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    /// Typed text
    Text(String),
    /// Base64 encoded WAV of a spoken utterance
    Audio(String),
}

impl TurnInput {
    /// Whether the turn was spoken
    #[must_use]
    pub const fn is_audio(&self) -> bool {
        matches!(self, Self::Audio(_))
    }
}

/// Request body for `/user_input`
#[derive(Debug, Serialize)]
struct UserInput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    utterance: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_input: Option<&'a str>,
    session_id: &'a str,
}

impl<'a> UserInput<'a> {
    fn new(input: &'a TurnInput, session_id: &'a str) -> Self {
        match input {
            TurnInput::Text(text) => Self {
                utterance: Some(text.as_str()),
                audio_input: None,
                session_id,
            },
            TurnInput::Audio(b64) => Self {
                utterance: None,
                audio_input: Some(b64.as_str()),
                session_id,
            },
        }
    }
}

/// Reply body from `/user_input`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TurnReply {
    /// Assistant's answer text
    pub transcription: String,

    /// What the backend heard, for spoken turns
    #[serde(default)]
    pub utterance: Option<String>,

    /// Base64 WAV of the synthesized answer
    #[serde(default)]
    pub audio_output: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,
}

impl TurnReply {
    /// Synthesized audio, if any was returned
    #[must_use]
    pub fn audio(&self) -> Option<&str> {
        self.audio_output.as_deref().filter(|a| !a.trim().is_empty())
    }

    /// Assistant's answer text
    #[must_use]
    pub fn response_text(&self) -> &str {
        &self.transcription
    }

    /// What the backend heard the user say, if it reported it
    #[must_use]
    pub fn heard(&self) -> Option<&str> {
        self.utterance.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// A conversation backend that answers one turn at a time
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Submit a turn and wait for the reply
    ///
    /// # Errors
    ///
    /// Returns [`Error::Request`] when the call fails and
    /// [`Error::Decode`] when the reply cannot be read
    async fn converse(&self, input: TurnInput) -> Result<TurnReply>;
}

/// HTTP client for the conversation endpoint
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
}

impl HttpBackend {
    /// Create a client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty or the HTTP client cannot be built
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base = config.url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(Error::Config("backend URL is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{base}/user_input"),
            session_id: config.session_id.clone(),
        })
    }

    /// Full URL turns are posted to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn converse(&self, input: TurnInput) -> Result<TurnReply> {
        let body = UserInput::new(&input, &self.session_id);

        tracing::debug!(
            endpoint = %self.endpoint,
            audio = input.is_audio(),
            "sending turn"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!("backend error {status}: {body}")));
        }

        let bytes = response.bytes().await?;
        let reply: TurnReply = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Decode(format!("invalid reply: {e}")))?;

        tracing::debug!(
            transcription_len = reply.transcription.len(),
            has_audio = reply.audio().is_some(),
            "received reply"
        );

        Ok(reply)
    }
}
