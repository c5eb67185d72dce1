//! TOML configuration file loading
//!
//! `~/.config/nfc-jukebox/config.toml` (platform equivalent elsewhere) is an
//! optional, partial overlay: every field may be omitted and environment
//! variables take precedence over it.
//!
//! ```toml
//! [spotify]
//! client_id = "..."
//! client_secret = "..."
//! device_name = "LIVING-ROOM"
//!
//! [device]
//! port = "/dev/ttyACM0"
//! framing = "quoted"
//!
//! [voice]
//! wake_word = "arduino"
//! stt_provider = "whisper"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct JukeboxConfigFile {
    /// Streaming service credentials and target device
    #[serde(default)]
    pub spotify: SpotifyFileConfig,

    /// Serial tag reader
    #[serde(default)]
    pub device: DeviceFileConfig,

    /// Voice input
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Volume throttle and rate-limit backoff
    #[serde(default)]
    pub throttle: ThrottleFileConfig,
}

/// Spotify application and playback target
#[derive(Debug, Default, Deserialize)]
pub struct SpotifyFileConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,

    /// Name of the output device playback is started on
    pub device_name: Option<String>,
}

/// Serial link settings
#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    pub enabled: Option<bool>,
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub read_timeout_ms: Option<u64>,

    /// "quoted" or "legacy"
    pub framing: Option<String>,
}

/// Voice input settings
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    pub enabled: Option<bool>,
    pub wake_word: Option<String>,

    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,
    pub stt_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub deepgram_api_key: Option<String>,
}

/// Throttle tuning
#[derive(Debug, Default, Deserialize)]
pub struct ThrottleFileConfig {
    pub min_interval_ms: Option<u64>,
    pub min_delta: Option<u8>,
    pub backoff_secs: Option<u64>,
}

/// Load the config file
///
/// With an explicit `path` the file must exist. Without one the standard
/// location is used and a missing file yields the defaults.
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn load_config_file(path: Option<&Path>) -> Result<JukeboxConfigFile> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match config_file_path() {
            Some(path) => (path, false),
            None => return Ok(JukeboxConfigFile::default()),
        },
    };

    if !required && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file");
        return Ok(JukeboxConfigFile::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to read config file");
        e
    })?;
    let config = toml::from_str(&content)?;

    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/nfc-jukebox/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("nfc-jukebox").join("config.toml"))
}
