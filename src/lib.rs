mod app;
mod bled112;
mod cli;
mod error;
mod myo;
mod protocol;
mod telemetry;
mod terminal;
mod utils;

pub use app::{DynMyo, RunOptions, open_session, run, run_with_clients, run_with_options};
pub use bled112::{
    ADDRESS_LEN, AttributeClient, ByteStream, Confirmation, DONGLE_USB_PID, DONGLE_USB_VID,
    DeviceAddress, DongleConfig, FakeAdvertisement, FakeDongle, FakeDongleConfig, FakeDongleLog,
    FakeNotifications, Framer, HEADER_LEN, ListenerId, MAX_PAYLOAD_LEN, MemoryStream, Opcode,
    Packet, PacketKind, PacketListener, SerialStream, TransportLink, detect_dongle_port,
};
pub use cli::{
    Args, Command, ControlAction, ControlArgs, DeviceSource, FakeArgs, LedArgs, LogLevel,
    OutputFormat, SetNameArgs, SleepModeArgs, StreamArgs, VibrateArgs,
};
pub use error::{
    CommandError, DecodeError, DongleError, FixtureError, HandlerError, Interrupted, LinkError,
    MyoError,
};
pub use myo::{
    Arm, ConnectionSummary, DataCategory, EmgSample, EventHandler, FirmwareVersion,
    HandlerRegistry, ImuSample, MAX_NAME_LEN, Myo, MyoEvent, Notification, Pose,
    ProtocolVariant, Rgb, SessionState, SleepMode, StopReason, SubscribeOptions, Vibration,
    XDirection, decode_notification,
};
pub use protocol::{Attribute, AttributeHandle, AttributeWrite, EmgMode, ImuMode, MYO_SERVICE_ID};
pub use terminal::{SystemTerminalClient, TerminalClient};
