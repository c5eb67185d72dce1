//! Serial link to the tag reader

use std::io::{ErrorKind, Read};
use std::thread::JoinHandle;
use std::time::Duration;

use serialport::SerialPort;
use tokio::sync::mpsc;

use crate::shutdown::Shutdown;
use crate::{Error, Result};

/// Default read timeout; also bounds how long the reader takes to notice shutdown
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Default baud rate of the reader firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Partial lines longer than this are discarded
const MAX_LINE_BYTES: usize = 4096;

/// Bytes pulled from the port per read
const READ_CHUNK: usize = 256;

/// Default port name for the platform
#[must_use]
pub fn default_port() -> &'static str {
    if cfg!(windows) { "COM3" } else { "/dev/ttyACM0" }
}

/// Where and how to open the serial link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Port name (`COM3`, `/dev/ttyACM0`, ...)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout
    pub read_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialSettings {
    /// Open the port
    ///
    /// # Errors
    ///
    /// Returns error if the port does not exist or cannot be opened
    pub fn open(&self) -> Result<Box<dyn SerialPort>> {
        let port = serialport::new(&self.port, self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| Error::Serial(format!("failed to open {}: {e}", self.port)))?;

        tracing::info!(port = %self.port, baud = self.baud_rate, "serial port opened");
        Ok(port)
    }
}

/// Splits a byte stream into `\n`-terminated lines
///
/// Bytes read past the end of a line are kept for the next call, so a line
/// split across two reads is reassembled.
pub struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    /// Wrap a reader
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    /// Read the next complete line
    ///
    /// Returns `Ok(None)` when the read timed out before a full line arrived.
    /// The line is decoded lossily and has trailing `\r`/`\n` removed.
    ///
    /// # Errors
    ///
    /// Returns error on any read failure other than a timeout
    pub fn read_line(&mut self) -> std::io::Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; READ_CHUNK];
        match self.inner.read(&mut chunk) {
            Ok(0) => return Ok(None),
            Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let line = self.take_line();
        if line.is_none() && self.pending.len() > MAX_LINE_BYTES {
            tracing::warn!(bytes = self.pending.len(), "discarding overlong serial line");
            self.pending.clear();
        }
        Ok(line)
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let text = String::from_utf8_lossy(&raw);
        Some(text.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Read lines on a dedicated thread and forward them to the device loop
///
/// The thread exits when shutdown is requested (within one read timeout),
/// when the receiver is dropped, or when the port fails. In every case the
/// sender is dropped, which ends the device loop.
///
/// # Errors
///
/// Returns error if the thread cannot be spawned
pub fn spawn_reader<R>(port: R, tx: mpsc::Sender<String>, shutdown: Shutdown) -> Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name("serial-reader".to_string())
        .spawn(move || {
            let mut reader = LineReader::new(port);

            while !shutdown.is_triggered() {
                match reader.read_line() {
                    Ok(Some(line)) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "serial read failed, device input stopped");
                        break;
                    }
                }
            }

            tracing::debug!("serial reader stopped");
        })?;

    Ok(handle)
}
