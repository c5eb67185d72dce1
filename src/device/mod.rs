//! Serial tag reader input
//!
//! A reader thread turns the serial byte stream into lines; the device loop
//! classifies each line and drives playback.

mod input;
mod line;
mod serial;

pub use input::DeviceInput;
pub use line::{ALBUM_PREFIX, DeviceLine, Framing, VOLUME_PREFIX};
pub use serial::{
    DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT, LineReader, SerialSettings, default_port,
    spawn_reader,
};
