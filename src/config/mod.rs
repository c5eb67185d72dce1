//! Configuration management for the jukebox bridge
//!
//! Sources, highest priority first: environment variables, the TOML config
//! file, built-in defaults. The refresh token may additionally come from the
//! token file written by `jukebox authorize`.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::actuator::DEFAULT_BACKOFF;
use crate::command::DEFAULT_WAKE_WORD;
use crate::device::{Framing, SerialSettings};
use crate::playback::{SpotifyCredentials, StoredToken};
use crate::throttle::{MIN_UPDATE_INTERVAL, MIN_VOLUME_DELTA};
use crate::voice::{SpeechToText, SttProvider};
use crate::{Error, Result};

use file::JukeboxConfigFile;

/// Redirect address used when none is configured
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5000/callback";

/// File name of the stored refresh token inside the data directory
pub const TOKEN_FILE: &str = "token.json";

/// Jukebox bridge configuration
#[derive(Debug)]
pub struct Config {
    /// Streaming service settings
    pub spotify: SpotifyConfig,

    /// Voice input settings
    pub voice: VoiceConfig,

    /// Tag reader settings
    pub device: DeviceConfig,

    /// Volume throttle settings
    pub throttle: ThrottleConfig,

    /// Directory for the stored refresh token
    pub data_dir: PathBuf,
}

/// Spotify application credentials and playback target
#[derive(Debug)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub redirect_uri: String,

    /// Refresh token from the environment or config file
    pub refresh_token: Option<SecretString>,

    /// Output device playback is started on (exact name match)
    pub device_name: Option<String>,
}

impl SpotifyConfig {
    /// Application credentials
    ///
    /// # Errors
    ///
    /// Returns error if the client id or secret is missing
    pub fn credentials(&self) -> Result<SpotifyCredentials> {
        let client_id = self.client_id.clone().ok_or_else(|| {
            Error::Config("SPOTIFY_CLIENT_ID (or spotify.client_id) is required".to_string())
        })?;
        let client_secret = self.client_secret.as_ref().ok_or_else(|| {
            Error::Config("SPOTIFY_CLIENT_SECRET (or spotify.client_secret) is required".to_string())
        })?;

        Ok(SpotifyCredentials {
            client_id,
            client_secret: SecretString::from(client_secret.expose_secret().to_string()),
            redirect_uri: self.redirect_uri.clone(),
        })
    }

    /// Target device name
    ///
    /// # Errors
    ///
    /// Returns error if no device name is configured
    pub fn device_name(&self) -> Result<&str> {
        self.device_name.as_deref().ok_or_else(|| {
            Error::Config(
                "JUKEBOX_DEVICE_NAME (or spotify.device_name) is required; run `jukebox devices` to list names"
                    .to_string(),
            )
        })
    }
}

/// Voice input configuration
#[derive(Debug)]
pub struct VoiceConfig {
    /// Run the voice loop
    pub enabled: bool,

    /// Word every command starts with
    pub wake_word: String,

    /// Hosted transcription backend
    pub stt_provider: SttProvider,

    /// Transcription model
    pub stt_model: String,

    /// API key for `stt_provider`
    pub api_key: Option<SecretString>,
}

impl VoiceConfig {
    /// Build the transcription client
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn speech_to_text(&self) -> Result<SpeechToText> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "{} is required for voice input (or pass --disable-voice)",
                self.stt_provider.api_key_var()
            ))
        })?;

        SpeechToText::new(
            self.stt_provider,
            SecretString::from(api_key.expose_secret().to_string()),
            self.stt_model.clone(),
        )
    }
}

/// Tag reader configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Run the device loop
    pub enabled: bool,

    /// Serial port settings
    pub serial: SerialSettings,

    /// Album URI framing
    pub framing: Framing,
}

/// Volume throttle configuration
#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// Minimum time between applied volume changes
    pub min_interval: Duration,

    /// Minimum change worth sending
    pub min_delta: u8,

    /// Pause after a rate-limit response
    pub backoff: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: MIN_UPDATE_INTERVAL,
            min_delta: MIN_VOLUME_DELTA,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Return the data directory: `~/.local/share/nfc-jukebox` on Linux
pub fn data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".nfc-jukebox"),
        |d| d.data_dir().join("nfc-jukebox"),
    )
}

/// Parse an optional value, naming the source in the error
fn parse_opt<T: std::str::FromStr>(value: Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("invalid {name} {v:?}: {e}")))
        })
        .transpose()
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file is unreadable or a value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        Self::from_sources(fc, |name| std::env::var(name).ok(), data_dir())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value cannot be parsed
    pub fn from_sources(
        fc: JukeboxConfigFile,
        env: impl Fn(&str) -> Option<String>,
        data_dir: PathBuf,
    ) -> Result<Self> {
        // Empty variables count as unset
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let spotify = SpotifyConfig {
            client_id: env("SPOTIFY_CLIENT_ID").or(fc.spotify.client_id),
            client_secret: env("SPOTIFY_CLIENT_SECRET")
                .or(fc.spotify.client_secret)
                .map(SecretString::from),
            redirect_uri: env("SPOTIFY_REDIRECT_URI")
                .or(fc.spotify.redirect_uri)
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            refresh_token: env("SPOTIFY_REFRESH_TOKEN")
                .or(fc.spotify.refresh_token)
                .map(SecretString::from),
            device_name: env("JUKEBOX_DEVICE_NAME").or(fc.spotify.device_name),
        };

        let stt_provider = parse_opt::<SttProvider>(
            env("JUKEBOX_STT_PROVIDER").or(fc.voice.stt_provider),
            "STT provider",
        )?
        .unwrap_or_default();

        let api_key = match stt_provider {
            SttProvider::Whisper => env("OPENAI_API_KEY").or(fc.voice.openai_api_key),
            SttProvider::Deepgram => env("DEEPGRAM_API_KEY").or(fc.voice.deepgram_api_key),
        };

        let voice = VoiceConfig {
            enabled: !env("JUKEBOX_DISABLE_VOICE").is_some_and(|v| parse_flag(&v))
                && fc.voice.enabled.unwrap_or(true),
            wake_word: env("JUKEBOX_WAKE_WORD")
                .or(fc.voice.wake_word)
                .unwrap_or_else(|| DEFAULT_WAKE_WORD.to_string()),
            stt_model: env("JUKEBOX_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| stt_provider.default_model().to_string()),
            stt_provider,
            api_key: api_key.map(SecretString::from),
        };

        if voice.wake_word.trim().is_empty() {
            return Err(Error::Config("wake word must not be empty".to_string()));
        }

        let defaults = SerialSettings::default();
        let serial = SerialSettings {
            port: env("JUKEBOX_SERIAL_PORT")
                .or(fc.device.port)
                .unwrap_or(defaults.port),
            baud_rate: parse_opt(env("JUKEBOX_SERIAL_BAUD"), "serial baud rate")?
                .or(fc.device.baud_rate)
                .unwrap_or(defaults.baud_rate),
            read_timeout: fc
                .device
                .read_timeout_ms
                .map_or(defaults.read_timeout, Duration::from_millis),
        };

        let device = DeviceConfig {
            enabled: !env("JUKEBOX_DISABLE_DEVICE").is_some_and(|v| parse_flag(&v))
                && fc.device.enabled.unwrap_or(true),
            serial,
            framing: parse_opt::<Framing>(env("JUKEBOX_FRAMING").or(fc.device.framing), "framing")?
                .unwrap_or_default(),
        };

        let defaults = ThrottleConfig::default();
        let throttle = ThrottleConfig {
            min_interval: fc
                .throttle
                .min_interval_ms
                .map_or(defaults.min_interval, Duration::from_millis),
            min_delta: fc.throttle.min_delta.unwrap_or(defaults.min_delta),
            backoff: fc
                .throttle
                .backoff_secs
                .map_or(defaults.backoff, Duration::from_secs),
        };

        Ok(Self {
            spotify,
            voice,
            device,
            throttle,
            data_dir,
        })
    }

    /// Path of the stored refresh token
    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_FILE)
    }

    /// Refresh token from the configuration, else from the token file
    ///
    /// # Errors
    ///
    /// Returns error if neither source has a token
    pub fn refresh_token(&self) -> Result<SecretString> {
        if let Some(token) = &self.spotify.refresh_token {
            return Ok(SecretString::from(token.expose_secret().to_string()));
        }

        let path = self.token_path();
        match StoredToken::load(&path)? {
            Some(stored) => {
                tracing::debug!(
                    path = %path.display(),
                    obtained_at = %stored.obtained_at,
                    "using stored refresh token"
                );
                Ok(SecretString::from(stored.refresh_token))
            }
            None => Err(Error::Config(
                "no Spotify refresh token; run `jukebox authorize` or set SPOTIFY_REFRESH_TOKEN"
                    .to_string(),
            )),
        }
    }
}
