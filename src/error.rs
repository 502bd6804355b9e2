use derive_more::From;
use thiserror::Error;

use crate::protocol::AttributeHandle;

/// Error type returned by event handlers and packet listeners.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while locating or opening the BLED112 dongle.
#[derive(Debug, Error)]
pub enum DongleError {
    #[error("no BLED112 dongle (USB {vid:04x}:{pid:04x}) was found")]
    NotFound { vid: u16, pid: u16 },
    #[error("failed to open serial port `{tty}`")]
    Open {
        tty: String,
        source: serialport::Error,
    },
    #[error("serial port operation failed")]
    Serial(#[from] serialport::Error),
}

/// Errors raised by the BGAPI transport link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("I/O error on the dongle byte stream")]
    Io(#[from] std::io::Error),
    #[error("the dongle byte stream closed while waiting for a packet")]
    StreamClosed,
    #[error("command payload is too large: {len} bytes exceeds max {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("a packet listener failed")]
    Handler(#[source] HandlerError),
}

/// Invalid device command parameters, rejected before any I/O.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CommandError {
    #[error("invalid sleep mode {value}; supported values are 0 and 1")]
    InvalidSleepMode { value: u8 },
    #[error("invalid vibration length {value}; supported values are 1, 2, 3")]
    InvalidVibration { value: u8 },
    #[error("invalid EMG mode {value}; supported values are 0, 1, 2, 3")]
    InvalidEmgMode { value: u8 },
    #[error("device name is too long: {len} bytes exceeds max {max}")]
    NameTooLong { len: usize, max: usize },
    #[error("invalid device address `{value}`; expected six colon-separated hex octets")]
    InvalidAddress { value: String },
    #[error("invalid colour `{value}`; expected six hex digits such as `00ff00`")]
    InvalidColour { value: String },
}

/// Errors returned while decoding notification payloads.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("notification on {handle} has {actual} bytes, expected {expected}")]
    UnexpectedLength {
        handle: AttributeHandle,
        expected: usize,
        actual: usize,
    },
    #[error("notification on {handle} has {actual} bytes, expected at least {minimum}")]
    TooShort {
        handle: AttributeHandle,
        minimum: usize,
        actual: usize,
    },
    #[error("no decoder for notifications on {handle}")]
    UnknownHandle { handle: AttributeHandle },
    #[error("unknown arm value {value}")]
    UnknownArm { value: u8 },
    #[error("unknown x-direction value {value}")]
    UnknownXDirection { value: u8 },
    #[error("unknown pose value {value}")]
    UnknownPose { value: u8 },
}

/// Errors returned by Myo session operations.
#[derive(Debug, Error, From)]
pub enum MyoError {
    #[error(transparent)]
    Link(LinkError),
    #[error(transparent)]
    Dongle(DongleError),
    #[error(transparent)]
    Command(CommandError),
    #[error("attribute {handle} returned {actual} bytes, expected {expected}")]
    #[from(skip)]
    MalformedAttribute {
        handle: AttributeHandle,
        expected: usize,
        actual: usize,
    },
    #[error("device name is not valid UTF-8")]
    InvalidName(std::string::FromUtf8Error),
    #[error("operation requires an active connection")]
    #[from(skip)]
    NotConnected,
    #[error("connect response carried no connection handle")]
    #[from(skip)]
    MissingConnectionHandle,
}

/// Errors returned when parsing simulated dongle fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("notification fixtures must look like `handle:hexvalue`, got `{value}`")]
    InvalidNotificationRecord { value: String },
    #[error("invalid attribute handle `{value}`")]
    InvalidHandle { value: String },
    #[error("invalid hex payload")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("firmware versions must look like `major.minor.patch.revision`, got `{value}`")]
    InvalidFirmwareVersion { value: String },
}

/// Returned when Ctrl+C arrives and the session does not stop in time.
#[derive(Debug, Error)]
#[error("interrupted before the armband session finished")]
pub struct Interrupted;

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
