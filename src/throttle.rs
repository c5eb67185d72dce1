//! Volume throttle
//!
//! Volume changes arrive from a physical knob (through the tag reader) and
//! from voice, often in bursts. A change is applied only when at least
//! `min_interval` has passed since the last applied change and it differs
//! from the last applied level by at least `min_delta` points.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::actuator::PlaybackActuator;

/// Minimum time between applied volume changes
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Minimum change (in percentage points) worth sending
pub const MIN_VOLUME_DELTA: u8 = 5;

/// Output volume in percent, always within 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Volume(u8);

/// Error parsing a volume level
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VolumeError {
    /// Input was not an integer
    #[error("not a volume level: {0:?}")]
    NotANumber(String),
    /// Integer outside 0-100
    #[error("volume {0} outside 0-100")]
    OutOfRange(i64),
}

impl Volume {
    /// Highest accepted level
    pub const MAX: u8 = 100;

    /// Create a volume, `None` above 100
    #[must_use]
    pub const fn new(percent: u8) -> Option<Self> {
        if percent <= Self::MAX {
            Some(Self(percent))
        } else {
            None
        }
    }

    /// Level in percent
    #[must_use]
    pub const fn percent(self) -> u8 {
        self.0
    }

    /// Absolute difference in percentage points
    #[must_use]
    pub const fn distance(self, other: Self) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl TryFrom<i64> for Volume {
    type Error = VolumeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or(VolumeError::OutOfRange(value))
    }
}

impl FromStr for Volume {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| VolumeError::NotANumber(trimmed.to_string()))?;
        Self::try_from(value)
    }
}

impl std::fmt::Display for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Why a volume request was or was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleOutcome {
    /// Sent to the service and recorded
    Applied,
    /// Arrived within the minimum interval of the last applied change
    TooSoon,
    /// Too close to the last applied level
    TooSmall,
    /// The remote call failed or was skipped during a cooldown
    Failed,
}

impl ThrottleOutcome {
    /// Whether the volume change reached the service
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Shared throttle state, only touched under the lock
#[derive(Debug, Default)]
struct ThrottleState {
    last_volume: Option<Volume>,
    last_update: Option<Instant>,
}

/// Debounces volume changes shared by every input source
pub struct VolumeThrottle {
    actuator: Arc<PlaybackActuator>,
    state: Mutex<ThrottleState>,
    min_interval: Duration,
    min_delta: u8,
}

impl VolumeThrottle {
    /// Create a throttle with the default interval and delta
    #[must_use]
    pub fn new(actuator: Arc<PlaybackActuator>) -> Self {
        Self::with_limits(actuator, MIN_UPDATE_INTERVAL, MIN_VOLUME_DELTA)
    }

    /// Create a throttle with explicit limits
    #[must_use]
    pub fn with_limits(actuator: Arc<PlaybackActuator>, min_interval: Duration, min_delta: u8) -> Self {
        Self {
            actuator,
            state: Mutex::new(ThrottleState::default()),
            min_interval,
            min_delta,
        }
    }

    /// Last volume that was actually applied
    pub async fn last_volume(&self) -> Option<Volume> {
        self.state.lock().await.last_volume
    }

    /// Apply `volume` if both the interval and the delta checks pass
    ///
    /// The check and the remote call happen under one lock, so of two
    /// requests racing inside the same interval exactly one is applied. On a
    /// rate-limit response the lock is released before the backoff is taken.
    pub async fn request_volume(&self, volume: Volume) -> ThrottleOutcome {
        let arrived = Instant::now();
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_update {
            if arrived.saturating_duration_since(last) < self.min_interval {
                tracing::debug!(volume = volume.percent(), "volume change too soon, dropped");
                return ThrottleOutcome::TooSoon;
            }
        }

        if let Some(last) = state.last_volume {
            if volume.distance(last) < self.min_delta {
                tracing::debug!(
                    volume = volume.percent(),
                    last = last.percent(),
                    "volume change too small, dropped"
                );
                return ThrottleOutcome::TooSmall;
            }
        }

        match self.actuator.set_volume(volume).await {
            Ok(()) => {
                state.last_volume = Some(volume);
                state.last_update = Some(state.last_update.map_or(arrived, |t| t.max(arrived)));
                ThrottleOutcome::Applied
            }
            Err(e) => {
                drop(state);
                self.actuator.handle_failure("set volume", e).await;
                ThrottleOutcome::Failed
            }
        }
    }
}
