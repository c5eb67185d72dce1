//! Spoken command grammar
//!
//! Every command starts with a wake word (`arduino` by default):
//!
//! ```text
//! arduino play song <name>
//! arduino play album <name>
//! arduino volume <0-100>
//! arduino pause
//! arduino exit
//! ```
//!
//! Matching is case-insensitive. Punctuation the transcription services
//! insert ("Arduino, pause.") and repeated whitespace are ignored.

use thiserror::Error;

use crate::throttle::{Volume, VolumeError};

/// Default wake word
pub const DEFAULT_WAKE_WORD: &str = "arduino";

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Search for a song and play it
    PlaySongByName(String),
    /// Search for an album and play it
    PlayAlbumByName(String),
    /// Play a known album (or other catalog) URI
    PlayAlbumByUri(String),
    /// Change the output volume
    SetVolume(Volume),
    /// Pause playback
    Pause,
    /// Pause playback and shut the bridge down
    Exit,
    /// Not a command
    Unrecognized,
}

/// Command text that matched a form but could not be completed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// `play song` / `play album` without a name
    #[error("no {0} name provided")]
    MissingArgument(&'static str),
    /// `volume` without a usable level
    #[error("invalid volume: {0}")]
    InvalidVolume(#[from] VolumeError),
}

/// Parses transcripts into commands
#[derive(Debug, Clone)]
pub struct CommandParser {
    wake_word: String,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new(DEFAULT_WAKE_WORD)
    }
}

impl CommandParser {
    /// Create a parser for the given wake word
    #[must_use]
    pub fn new(wake_word: &str) -> Self {
        Self {
            wake_word: fold_transcript(wake_word),
        }
    }

    /// The normalized wake word
    #[must_use]
    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }

    /// Parse a transcript
    ///
    /// # Errors
    ///
    /// Returns error if the text matches a command form but its argument is
    /// missing or invalid. Text matching no form is `Ok(Unrecognized)`.
    pub fn parse(&self, text: &str) -> Result<Command, CommandError> {
        let text = fold_transcript(text);

        let Some(rest) = text.strip_prefix(self.wake_word.as_str()) else {
            return Ok(Command::Unrecognized);
        };

        if let Some(name) = rest.strip_prefix(" play song") {
            return non_empty(name, "song").map(Command::PlaySongByName);
        }

        if let Some(name) = rest.strip_prefix(" play album") {
            return non_empty(name, "album").map(Command::PlayAlbumByName);
        }

        if let Some(level) = rest.strip_prefix(" volume") {
            let level = level.trim().trim_end_matches('%').trim_end_matches("percent").trim();
            if level.is_empty() {
                return Err(CommandError::MissingArgument("volume"));
            }
            return Ok(Command::SetVolume(level.parse()?));
        }

        Ok(match rest {
            " pause" => Command::Pause,
            " exit" => Command::Exit,
            _ => Command::Unrecognized,
        })
    }
}

/// Lower-case, turn sentence punctuation into spaces and collapse whitespace
#[must_use]
pub fn fold_transcript(text: &str) -> String {
    text.to_lowercase()
        .replace([',', ';', ':', '.', '!', '?'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(name: &str, what: &'static str) -> Result<String, CommandError> {
    let name = name.trim();
    if name.is_empty() {
        Err(CommandError::MissingArgument(what))
    } else {
        Ok(name.to_string())
    }
}
