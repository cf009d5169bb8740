//! Configuration management for the satellite

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::voice::VadConfig;

/// Default conversation backend base URL
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Default wake word WebSocket URL
pub const DEFAULT_WAKE_URL: &str = "ws://localhost:8000/ws";

/// Default session identifier
pub const DEFAULT_SESSION_ID: &str = "websat0000";

/// Default activation label reported by the wake backend
pub const DEFAULT_ACTIVATION_LABEL: &str = "hey_neon_high";

/// Default minimum time between honored activations
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(3000);

/// Default samples per streamed capture frame
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Satellite configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Conversation backend
    pub backend: BackendConfig,

    /// Wake word channel
    pub wake: WakeConfig,

    /// Microphone capture
    pub capture: CaptureConfig,

    /// Voice activity detection
    pub vad: VadConfig,

    /// Acknowledgment chime WAV; a synthesized chime is used when unset
    pub chime_path: Option<PathBuf>,

    /// Directory holding the conversation log
    pub data_dir: PathBuf,
}

/// Conversation backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL the `/user_input` route hangs off
    pub url: String,

    /// Session identifier sent with every turn
    pub session_id: String,

    /// Request timeout
    pub timeout: Duration,
}

/// Wake word channel configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Connect to the wake backend at all
    pub enabled: bool,

    /// WebSocket URL
    pub url: String,

    /// Label that counts as an activation
    pub activation_label: String,

    /// Minimum time between honored activations
    pub cooldown: Duration,
}

/// Microphone capture configuration
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Samples per streamed frame
    pub frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            wake: WakeConfig::default(),
            capture: CaptureConfig::default(),
            vad: VadConfig::default(),
            chime_path: None,
            data_dir: default_data_dir(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_WAKE_URL.to_string(),
            activation_label: DEFAULT_ACTIVATION_LABEL.to_string(),
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

/// Default data directory: `~/.local/share/omni/satellite` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/omni/satellite"),
        |d| d.data_dir().join("omni").join("satellite"),
    )
}

impl Config {
    /// Load configuration (env > toml > default)
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        let config = Self::from_file_config(fc);

        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            tracing::warn!(
                path = %config.data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }

        config
    }

    /// Overlay environment variables and a parsed config file on the defaults
    #[must_use]
    pub fn from_file_config(fc: file::SatelliteConfigFile) -> Self {
        let default = Self::default();

        let backend = BackendConfig {
            url: std::env::var("SATELLITE_BACKEND_URL")
                .ok()
                .or(fc.backend.url)
                .unwrap_or(default.backend.url),
            session_id: std::env::var("SATELLITE_SESSION_ID")
                .ok()
                .or(fc.backend.session_id)
                .unwrap_or(default.backend.session_id),
            timeout: fc
                .backend
                .timeout_secs
                .map_or(default.backend.timeout, Duration::from_secs),
        };

        let wake = WakeConfig {
            enabled: std::env::var("SATELLITE_WAKE_ENABLED")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.wake.enabled)
                .unwrap_or(default.wake.enabled),
            url: std::env::var("SATELLITE_WAKE_URL")
                .ok()
                .or(fc.wake.url)
                .unwrap_or(default.wake.url),
            activation_label: std::env::var("SATELLITE_ACTIVATION_LABEL")
                .ok()
                .or(fc.wake.activation_label)
                .unwrap_or(default.wake.activation_label),
            cooldown: fc
                .wake
                .cooldown_ms
                .map_or(default.wake.cooldown, Duration::from_millis),
        };

        let capture = CaptureConfig {
            frame_size: fc
                .capture
                .frame_size
                .filter(|&n| n > 0)
                .unwrap_or(default.capture.frame_size),
        };

        let vad = VadConfig {
            energy_threshold: fc.vad.energy_threshold.unwrap_or(default.vad.energy_threshold),
            min_speech_ms: fc.vad.min_speech_ms.unwrap_or(default.vad.min_speech_ms),
            silence_ms: fc.vad.silence_ms.unwrap_or(default.vad.silence_ms),
            pre_speech_ms: fc.vad.pre_speech_ms.unwrap_or(default.vad.pre_speech_ms),
            max_utterance_ms: fc.vad.max_utterance_ms.unwrap_or(default.vad.max_utterance_ms),
        };

        let chime_path = std::env::var("SATELLITE_CHIME_PATH")
            .ok()
            .or(fc.audio.chime_path)
            .map(PathBuf::from);

        let data_dir = std::env::var("SATELLITE_DATA_DIR")
            .ok()
            .or(fc.data_dir)
            .map_or(default.data_dir, PathBuf::from);

        Self {
            backend,
            wake,
            capture,
            vad,
            chime_path,
            data_dir,
        }
    }

    /// Path of the JSON conversation log
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("chat_history.json")
    }
}
