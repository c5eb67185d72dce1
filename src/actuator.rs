//! Playback actuator
//!
//! Wraps the remote transport controls (start, pause, volume) and owns the
//! rate-limit backoff. After a 429 the actuator records a cooldown deadline;
//! every remote call attempted before the deadline is skipped instead of
//! being sent, and the caller that hit the limit waits out the backoff.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::playback::{CatalogItem, ItemKind, PlaybackService};
use crate::shutdown::Shutdown;
use crate::throttle::Volume;
use crate::{Error, Result};

/// Default pause after a rate-limit response
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Result of a play request that did not fail outright
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Playback was started with this many tracks
    Started {
        /// Number of track URIs handed to the service
        tracks: usize,
    },
    /// The service reported no devices at all
    NoDevices,
    /// Devices exist but none has the configured name
    DeviceNotFound,
    /// The album or playlist had no playable tracks
    NoTracks,
}

/// Drives the remote playback service
pub struct PlaybackActuator {
    service: Arc<dyn PlaybackService>,
    device_name: String,
    backoff: Duration,
    cooldown_until: Mutex<Option<Instant>>,
    shutdown: Shutdown,
}

impl PlaybackActuator {
    /// Create an actuator that plays on the device named `device_name`
    #[must_use]
    pub fn new(
        service: Arc<dyn PlaybackService>,
        device_name: impl Into<String>,
        backoff: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            service,
            device_name: device_name.into(),
            backoff,
            cooldown_until: Mutex::new(None),
            shutdown,
        }
    }

    /// Fail with `CoolingDown` while a rate-limit backoff is in effect
    fn check_cooldown(&self) -> Result<()> {
        let guard = self.cooldown_until.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(until) = *guard {
            let now = Instant::now();
            if now < until {
                return Err(Error::CoolingDown {
                    remaining: until - now,
                });
            }
        }
        Ok(())
    }

    /// Whether a rate-limit cooldown is currently active
    #[must_use]
    pub fn is_cooling_down(&self) -> bool {
        self.check_cooldown().is_err()
    }

    /// Start (or extend) the cooldown window
    fn start_cooldown(&self) {
        let until = Instant::now() + self.backoff;
        let mut guard = self.cooldown_until.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(guard.map_or(until, |current| current.max(until)));
    }

    /// Report a failed remote call
    ///
    /// Rate limiting starts the cooldown and waits out the backoff (returning
    /// early on shutdown); the original request is not retried. Everything
    /// else is logged.
    pub async fn handle_failure(&self, action: &str, error: Error) {
        match error {
            Error::RateLimited { retry_after } => {
                self.start_cooldown();
                tracing::warn!(
                    action,
                    backoff_secs = self.backoff.as_secs(),
                    retry_after_secs = retry_after.map(|d| d.as_secs()),
                    "rate limit exceeded, pausing"
                );

                tokio::select! {
                    () = tokio::time::sleep(self.backoff) => {
                        tracing::info!(action, "rate-limit backoff finished");
                    }
                    () = self.shutdown.triggered() => {
                        tracing::debug!(action, "backoff interrupted by shutdown");
                    }
                }
            }
            Error::CoolingDown { remaining } => {
                tracing::warn!(
                    action,
                    remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                    "skipped during rate-limit cooldown"
                );
            }
            other => {
                tracing::error!(action, error = %other, "playback service error");
            }
        }
    }

    /// Look up the configured device
    ///
    /// `Ok(Err(outcome))` means the lookup worked but there is nothing to
    /// play on.
    async fn find_device(&self) -> Result<std::result::Result<String, PlayOutcome>> {
        let devices = self.service.devices().await?;

        if devices.is_empty() {
            tracing::warn!("no active devices found, open Spotify on the target device");
            return Ok(Err(PlayOutcome::NoDevices));
        }

        match devices.into_iter().find(|d| d.name == self.device_name) {
            Some(device) => Ok(Ok(device.id)),
            None => {
                tracing::warn!(
                    device = %self.device_name,
                    "device not found, make sure it is active"
                );
                Ok(Err(PlayOutcome::DeviceNotFound))
            }
        }
    }

    /// Resolve device and tracks, then start playback
    async fn try_play(&self, uri: &str, kind: ItemKind) -> Result<PlayOutcome> {
        self.check_cooldown()?;

        let device_id = match self.find_device().await? {
            Ok(id) => id,
            Err(outcome) => return Ok(outcome),
        };

        let uris = match kind {
            ItemKind::Track => vec![uri.to_string()],
            ItemKind::Album => self.service.album_tracks(uri).await?,
            ItemKind::Playlist => self.service.playlist_tracks(uri).await?,
        };

        if uris.is_empty() {
            tracing::warn!(uri, %kind, "no tracks found");
            return Ok(PlayOutcome::NoTracks);
        }

        self.service.start_playback(&device_id, &uris).await?;
        tracing::info!(uri, %kind, tracks = uris.len(), "playback started");

        Ok(PlayOutcome::Started { tracks: uris.len() })
    }

    /// Play a track, album or playlist URI
    ///
    /// Returns `None` when the remote call failed (already logged).
    pub async fn play(&self, uri: &str, kind: ItemKind) -> Option<PlayOutcome> {
        match self.try_play(uri, kind).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.handle_failure("play", e).await;
                None
            }
        }
    }

    /// Play a URI, inferring its kind; unknown shapes are treated as albums
    pub async fn play_uri(&self, uri: &str) -> Option<PlayOutcome> {
        let kind = ItemKind::from_uri(uri).unwrap_or_else(|| {
            tracing::debug!(uri, "unrecognised URI shape, treating as album");
            ItemKind::Album
        });
        self.play(uri, kind).await
    }

    /// Single-result catalog search
    ///
    /// Returns `None` both for "no match" and for failures (logged).
    pub async fn search(&self, query: &str, kind: ItemKind) -> Option<CatalogItem> {
        let result = match self.check_cooldown() {
            Ok(()) => self.service.search(query, kind).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(item)) => Some(item),
            Ok(None) => {
                tracing::info!(query, %kind, "no match found");
                None
            }
            Err(e) => {
                self.handle_failure("search", e).await;
                None
            }
        }
    }

    /// Pause playback; failures are logged, not escalated
    pub async fn pause(&self) -> bool {
        let result = match self.check_cooldown() {
            Ok(()) => self.service.pause().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!("playback paused");
                true
            }
            Err(e) => {
                self.handle_failure("pause", e).await;
                false
            }
        }
    }

    /// Send a volume change to the service
    ///
    /// Unlike the other operations this returns the error, so the volume
    /// throttle can release its lock before any backoff is taken.
    ///
    /// # Errors
    ///
    /// Returns `CoolingDown` during a backoff, otherwise the service error
    pub async fn set_volume(&self, volume: Volume) -> Result<()> {
        self.check_cooldown()?;
        self.service.set_volume(volume.percent()).await?;
        tracing::info!(volume = volume.percent(), "volume set");
        Ok(())
    }
}
