//! Device input loop

use std::sync::Arc;

use tokio::sync::mpsc;

use super::line::{DeviceLine, Framing};
use crate::actuator::PlaybackActuator;
use crate::shutdown::Shutdown;
use crate::throttle::VolumeThrottle;

/// Dispatches tag reader lines
///
/// Album messages go straight to the actuator; volume messages go through
/// the shared throttle.
pub struct DeviceInput {
    framing: Framing,
    actuator: Arc<PlaybackActuator>,
    throttle: Arc<VolumeThrottle>,
}

impl DeviceInput {
    /// Create a dispatcher
    #[must_use]
    pub const fn new(
        framing: Framing,
        actuator: Arc<PlaybackActuator>,
        throttle: Arc<VolumeThrottle>,
    ) -> Self {
        Self {
            framing,
            actuator,
            throttle,
        }
    }

    /// Classify and act on one line
    pub async fn handle_line(&self, line: &str) -> DeviceLine {
        let parsed = DeviceLine::parse(line, self.framing);

        match &parsed {
            DeviceLine::Empty => {}
            DeviceLine::AlbumUri(uri) => {
                tracing::info!(uri = %uri, "tag scanned");
                self.actuator.play_uri(uri).await;
            }
            DeviceLine::Volume(volume) => {
                let outcome = self.throttle.request_volume(*volume).await;
                tracing::debug!(volume = volume.percent(), ?outcome, "device volume request");
            }
            DeviceLine::Invalid(reason) => {
                tracing::warn!(line, reason = %reason, "skipping malformed device line");
            }
            DeviceLine::Unknown(text) => {
                tracing::debug!(line = %text, "ignoring device output");
            }
        }

        parsed
    }

    /// Consume lines until shutdown or until the reader goes away
    pub async fn run(&self, mut rx: mpsc::Receiver<String>, shutdown: Shutdown) {
        tracing::info!(framing = %self.framing, "device input loop started");

        loop {
            let line = tokio::select! {
                () = shutdown.triggered() => break,
                line = rx.recv() => line,
            };

            let Some(line) = line else {
                tracing::warn!("device reader closed");
                break;
            };

            self.handle_line(&line).await;
        }

        tracing::info!("device input loop stopped");
    }
}
