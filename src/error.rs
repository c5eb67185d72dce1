//! Error types for the jukebox bridge

use std::time::Duration;

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the jukebox bridge
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text service error
    #[error("STT error: {0}")]
    Stt(String),

    /// Speech was captured but no words could be recognised
    #[error("could not understand audio")]
    Unintelligible,

    /// Serial link error
    #[error("serial error: {0}")]
    Serial(String),

    /// Remote service answered with 429 Too Many Requests
    #[error("rate limited by playback service")]
    RateLimited {
        /// Value of the `Retry-After` header, if the service sent one
        retry_after: Option<Duration>,
    },

    /// A remote call was skipped because a rate-limit cooldown is active
    #[error("rate-limit cooldown active ({remaining:?} left)")]
    CoolingDown {
        /// Time until the cooldown ends
        remaining: Duration,
    },

    /// Playback service error
    #[error("playback error: {0}")]
    Playback(String),

    /// Authorization error
    #[error("auth error: {0}")]
    Auth(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Self::Serial(err.to_string())
    }
}
