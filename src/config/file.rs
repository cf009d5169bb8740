//! TOML configuration file loading
//!
//! Supports `~/.config/omni/satellite/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SatelliteConfigFile {
    /// Conversation backend configuration
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Wake word channel configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Microphone capture configuration
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Voice activity detection tuning
    #[serde(default)]
    pub vad: VadFileConfig,

    /// Audio output configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Directory for the conversation log
    #[serde(default)]
    pub data_dir: Option<String>,
}

/// Conversation backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Base URL, `/user_input` is appended (e.g. "http://localhost:8000")
    pub url: Option<String>,

    /// Session identifier sent with every turn
    pub session_id: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Wake word channel configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Enable the wake word channel
    pub enabled: Option<bool>,

    /// WebSocket URL (e.g. "ws://localhost:8000/ws")
    pub url: Option<String>,

    /// Activation label that starts a turn (e.g. "hey_neon_high")
    pub activation_label: Option<String>,

    /// Minimum time between honored activations in milliseconds
    pub cooldown_ms: Option<u64>,
}

/// Microphone capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Samples per streamed frame
    pub frame_size: Option<usize>,
}

/// Voice activity detection tuning
#[derive(Debug, Default, Deserialize)]
pub struct VadFileConfig {
    pub energy_threshold: Option<f32>,
    pub min_speech_ms: Option<u32>,
    pub silence_ms: Option<u32>,
    pub pre_speech_ms: Option<u32>,
    pub max_utterance_ms: Option<u32>,
}

/// Audio output configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// WAV file played when an activation is honored
    pub chime_path: Option<String>,
}

/// Parse a config file body
///
/// # Errors
///
/// Returns error if the TOML is malformed or has wrongly typed fields
pub fn parse_config_file(content: &str) -> crate::Result<SatelliteConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `SatelliteConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> SatelliteConfigFile {
    let Some(path) = config_file_path() else {
        return SatelliteConfigFile::default();
    };

    if !path.exists() {
        return SatelliteConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SatelliteConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SatelliteConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/satellite/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("satellite")
            .join("config.toml")
    })
}
