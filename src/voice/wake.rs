//! Wake word channel
//!
//! Streams captured frames to a remote wake word detector over a WebSocket
//! and surfaces activation messages. The server is told the sample rate in
//! a text message before binary PCM16 frames follow.

use std::collections::BTreeSet;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::capture::AudioFrame;
use crate::Result;

/// Wake word labels reported in a single detector message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationEvent {
    labels: BTreeSet<String>,
}

impl ActivationEvent {
    /// Build an event from reported labels
    #[must_use]
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `label` was reported
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// All reported labels
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// A decoded text message from the wake server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeMessage {
    /// One or more wake words fired
    Activation(ActivationEvent),
    /// Greeting listing the models the server loaded
    LoadedModels(Vec<String>),
    /// Anything else
    Ignored,
}

/// Decode a text message from the wake server
///
/// Activations arrive as `{"activations": [label, ...]}`; the server greets
/// with `{"loaded_models": [name, ...]}` on connect.
#[must_use]
pub fn parse_message(text: &str) -> WakeMessage {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) else {
        return WakeMessage::Ignored;
    };

    if let Some(labels) = map.get("activations").and_then(string_list) {
        return WakeMessage::Activation(ActivationEvent::new(labels));
    }

    if let Some(models) = map.get("loaded_models").and_then(string_list) {
        return WakeMessage::LoadedModels(models);
    }

    WakeMessage::Ignored
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|list| {
        list.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

enum Outbound {
    SampleRate(u32),
    Frame(Vec<u8>),
}

/// Live WebSocket connection to the wake word detector
///
/// Dropping the channel closes the connection.
pub struct WakeChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
    last_sample_rate: Option<u32>,
    send_failed: bool,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl WakeChannel {
    /// Connect to the detector; activations are forwarded to `activations`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transport`] if the connection cannot be opened
    pub async fn connect(
        url: &str,
        activations: mpsc::UnboundedSender<ActivationEvent>,
    ) -> Result<Self> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut sink, mut stream) = ws_stream.split();

        tracing::info!(url, "connected to wake word server");

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let msg = match msg {
                    Outbound::SampleRate(rate) => Message::text(rate.to_string()),
                    Outbound::Frame(bytes) => Message::binary(bytes),
                };
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!(error = %e, "wake word send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => match parse_message(text.as_str()) {
                        WakeMessage::Activation(event) => {
                            tracing::debug!(labels = ?event.labels, "wake word reported");
                            if activations.send(event).is_err() {
                                break;
                            }
                        }
                        WakeMessage::LoadedModels(models) => {
                            tracing::info!(?models, "wake word models loaded");
                        }
                        WakeMessage::Ignored => {
                            tracing::trace!(text = text.as_str(), "ignoring wake server message");
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        tracing::info!(?frame, "wake word server closed connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "wake word connection error");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            outbound,
            last_sample_rate: None,
            send_failed: false,
            writer,
            reader,
        })
    }

    /// Announce the capture sample rate; repeated rates are not resent
    pub fn send_sample_rate(&mut self, sample_rate: u32) {
        if self.last_sample_rate == Some(sample_rate) {
            return;
        }
        self.last_sample_rate = Some(sample_rate);
        self.push(Outbound::SampleRate(sample_rate));
    }

    /// Stream a PCM16 frame, announcing its sample rate first if it changed
    pub fn send_frame(&mut self, frame: &AudioFrame) {
        self.send_sample_rate(frame.sample_rate());
        self.push(Outbound::Frame(frame.to_le_bytes()));
    }

    /// Whether the connection is still up
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.writer.is_finished() && !self.reader.is_finished()
    }

    fn push(&mut self, msg: Outbound) {
        if self.outbound.send(msg).is_ok() {
            return;
        }
        // Frames are dropped once the connection is gone
        if self.send_failed {
            tracing::trace!("wake word connection closed, dropping frame");
        } else {
            self.send_failed = true;
            tracing::warn!("wake word connection closed, frames will be dropped");
        }
    }
}

impl Drop for WakeChannel {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}
