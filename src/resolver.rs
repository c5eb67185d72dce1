//! Command resolver: turns parsed commands into actuator calls

use std::sync::Arc;

use crate::actuator::{PlayOutcome, PlaybackActuator};
use crate::command::{Command, CommandError, CommandParser};
use crate::playback::ItemKind;
use crate::shutdown::Shutdown;
use crate::throttle::VolumeThrottle;

/// Maps commands onto the actuator, the throttle and the shutdown flag
///
/// Shared by both input loops; every method takes `&self`.
pub struct CommandResolver {
    parser: CommandParser,
    actuator: Arc<PlaybackActuator>,
    throttle: Arc<VolumeThrottle>,
    shutdown: Shutdown,
}

impl CommandResolver {
    /// Create a resolver
    #[must_use]
    pub const fn new(
        parser: CommandParser,
        actuator: Arc<PlaybackActuator>,
        throttle: Arc<VolumeThrottle>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            parser,
            actuator,
            throttle,
            shutdown,
        }
    }

    /// Wake word every voice command starts with
    #[must_use]
    pub fn wake_word(&self) -> &str {
        self.parser.wake_word()
    }

    /// Parse a transcript
    ///
    /// # Errors
    ///
    /// Returns error if a command form is matched with a missing argument
    pub fn resolve(&self, text: &str) -> Result<Command, CommandError> {
        self.parser.parse(text)
    }

    /// Parse and execute a transcript, logging parse errors
    pub async fn handle_text(&self, text: &str) {
        match self.resolve(text) {
            Ok(command) => self.execute(command).await,
            Err(e) => tracing::warn!(text, error = %e, "invalid command"),
        }
    }

    /// Execute a command. Failures are logged, never returned.
    pub async fn execute(&self, command: Command) {
        tracing::debug!(?command, "executing command");

        match command {
            Command::PlaySongByName(name) => {
                self.play_by_name(&name, ItemKind::Track).await;
            }
            Command::PlayAlbumByName(name) => {
                self.play_by_name(&name, ItemKind::Album).await;
            }
            Command::PlayAlbumByUri(uri) => {
                self.actuator.play_uri(&uri).await;
            }
            Command::SetVolume(volume) => {
                let outcome = self.throttle.request_volume(volume).await;
                tracing::debug!(volume = volume.percent(), ?outcome, "voice volume request");
            }
            Command::Pause => {
                self.actuator.pause().await;
            }
            Command::Exit => {
                self.actuator.pause().await;
                self.shutdown.trigger();
            }
            Command::Unrecognized => {
                tracing::info!("unrecognized command");
            }
        }
    }

    /// Search by name, then play the best match
    async fn play_by_name(&self, name: &str, kind: ItemKind) -> Option<PlayOutcome> {
        let item = self.actuator.search(name, kind).await?;
        tracing::info!(name = %item.name, uri = %item.uri, %kind, "playing");
        self.actuator.play(&item.uri, kind).await
    }
}
