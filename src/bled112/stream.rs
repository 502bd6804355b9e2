use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use bon::Builder;
use serialport::{SerialPort, SerialPortType};
use tracing::{debug, info, instrument};

use crate::error::DongleError;

/// USB vendor identifier of the BLED112 dongle.
pub const DONGLE_USB_VID: u16 = 0x2458;
/// USB product identifier of the BLED112 dongle.
pub const DONGLE_USB_PID: u16 = 0x0001;

const DEFAULT_BAUD_RATE: u32 = 9600;
const BLOCKING_POLL_INTERVAL: Duration = Duration::from_secs(1);
const READ_CHUNK_LEN: usize = 256;

/// A blocking byte source and sink carrying BGAPI frames.
pub trait ByteStream: Send {
    /// Writes every byte of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device rejects the write.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads one byte, blocking for at most `timeout` (forever when `None`).
    ///
    /// Returns `Ok(None)` when the timeout elapses or the stream is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device fails.
    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>>;

    /// Returns whether the stream can never yield another byte.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<T: ByteStream + ?Sized> ByteStream for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
        (**self).read_byte(timeout)
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Serial settings for the BLED112 dongle.
#[derive(Debug, Clone, Builder)]
pub struct DongleConfig {
    /// Serial device path; detected from the USB identifiers when omitted.
    #[builder(into)]
    tty: Option<String>,
    #[builder(default = DEFAULT_BAUD_RATE)]
    baud_rate: u32,
}

impl Default for DongleConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DongleConfig {
    /// Explicit serial device path, if configured.
    #[must_use]
    pub fn tty(&self) -> Option<&str> {
        self.tty.as_deref()
    }

    /// Serial baud rate.
    #[must_use]
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

/// Finds the serial device path of the first attached BLED112 dongle.
///
/// # Errors
///
/// Returns an error when ports cannot be enumerated or no dongle is attached.
#[instrument(level = "debug")]
pub fn detect_dongle_port() -> Result<String, DongleError> {
    let ports = serialport::available_ports()?;
    debug!(port_count = ports.len(), "enumerated serial ports");

    ports
        .into_iter()
        .find_map(|port| match port.port_type {
            SerialPortType::UsbPort(usb)
                if usb.vid == DONGLE_USB_VID && usb.pid == DONGLE_USB_PID =>
            {
                info!(
                    port = %port.port_name,
                    product = usb.product.as_deref().unwrap_or("<unknown>"),
                    "found BLED112 dongle"
                );
                Some(port.port_name)
            }
            _ => None,
        })
        .ok_or(DongleError::NotFound {
            vid: DONGLE_USB_VID,
            pid: DONGLE_USB_PID,
        })
}

/// Byte stream over the dongle's serial port.
pub struct SerialStream {
    port: Box<dyn SerialPort>,
    pending: VecDeque<u8>,
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("port", &self.port.name())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl SerialStream {
    /// Opens the configured (or detected) dongle.
    ///
    /// # Errors
    ///
    /// Returns an error when no dongle is found or the port cannot be opened.
    #[instrument(level = "debug")]
    pub fn open(config: &DongleConfig) -> Result<Self, DongleError> {
        let tty = match config.tty() {
            Some(tty) => tty.to_string(),
            None => detect_dongle_port()?,
        };

        let mut port = serialport::new(&tty, config.baud_rate())
            .timeout(BLOCKING_POLL_INTERVAL)
            .open()
            .map_err(|source| DongleError::Open {
                tty: tty.clone(),
                source,
            })?;
        port.write_data_terminal_ready(true)?;
        info!(%tty, baud_rate = config.baud_rate(), "opened dongle serial port");

        Ok(Self {
            port,
            pending: VecDeque::with_capacity(READ_CHUNK_LEN),
        })
    }

    fn fill(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_LEN];
        loop {
            self.port.set_timeout(timeout.unwrap_or(BLOCKING_POLL_INTERVAL))?;
            match self.port.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(read) => {
                    self.pending.extend(&chunk[..read]);
                    return Ok(true);
                }
                Err(error) if error.kind() == io::ErrorKind::TimedOut => {
                    if timeout.is_some() {
                        return Ok(false);
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error),
            }
        }
    }
}

impl ByteStream for SerialStream {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
        if self.pending.is_empty() && !self.fill(timeout)? {
            return Ok(None);
        }
        Ok(self.pending.pop_front())
    }
}

/// In-memory byte stream that replays queued input and records output.
///
/// Reads never block: an empty input queue reads as a closed stream.
#[derive(Debug, Default, Clone)]
pub struct MemoryStream {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
}

impl MemoryStream {
    /// Creates a stream that will yield `incoming` in order.
    #[must_use]
    pub fn new(incoming: impl Into<Vec<u8>>) -> Self {
        Self {
            incoming: incoming.into().into(),
            written: Vec::new(),
        }
    }

    /// Appends bytes to the input queue.
    pub fn push_incoming(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes);
    }

    /// Bytes written so far.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Number of queued input bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.incoming.len()
    }
}

impl ByteStream for MemoryStream {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Option<Duration>) -> io::Result<Option<u8>> {
        Ok(self.incoming.pop_front())
    }

    fn is_closed(&self) -> bool {
        self.incoming.is_empty()
    }
}
