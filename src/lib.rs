//! NFC Jukebox - voice and tag-reader bridge for Spotify playback
//!
//! Two independent input sources drive one playback target:
//! - Voice: spoken commands ("arduino play song ...") transcribed by a hosted
//!   speech-to-text service
//! - Device: an NFC/RFID reader on a serial link that prints album URIs and
//!   volume knob positions
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │  capture thread      │      │  serial thread       │
//! │  (cpal, detector)    │      │  (serialport)        │
//! └──────────┬───────────┘      └──────────┬───────────┘
//!            │ WAV                         │ lines
//! ┌──────────▼───────────┐      ┌──────────▼───────────┐
//! │  voice loop (STT)    │      │  device loop         │
//! └──────────┬───────────┘      └──────┬─────────┬─────┘
//!            │ text                    │ album   │ volume
//! ┌──────────▼───────────┐             │         │
//! │  command resolver    ├──── volume ─┼────┐    │
//! └──────────┬───────────┘             │  ┌─▼────▼─────┐
//!            │                         │  │  throttle  │
//! ┌──────────▼─────────────────────────▼──┴────────────┴─┐
//! │        playback actuator (cooldown on 429)           │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//!                     Spotify Web API
//! ```

pub mod actuator;
pub mod bridge;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod playback;
pub mod resolver;
pub mod shutdown;
pub mod throttle;
pub mod voice;

pub use actuator::{PlayOutcome, PlaybackActuator};
pub use bridge::{Bridge, BridgeContext};
pub use command::{Command, CommandError, CommandParser};
pub use config::Config;
pub use device::{DeviceInput, DeviceLine, Framing};
pub use error::{Error, Result};
pub use playback::{CatalogItem, ItemKind, OutputDevice, PlaybackService, SpotifyClient};
pub use resolver::CommandResolver;
pub use shutdown::Shutdown;
pub use throttle::{ThrottleOutcome, Volume, VolumeThrottle};
pub use voice::{SpeechToText, Transcriber, VoiceInput};
