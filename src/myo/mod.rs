mod commands;
mod decode;
mod events;
mod firmware;
mod registry;
mod session;

pub use commands::{MAX_NAME_LEN, Rgb, SleepMode, Vibration};
pub use decode::{Notification, decode_notification};
pub use events::{Arm, DataCategory, EmgSample, ImuSample, MyoEvent, Pose, XDirection};
pub use firmware::{FirmwareVersion, ProtocolVariant, SubscribeOptions};
pub use registry::{EventHandler, HandlerRegistry};
pub use session::{ConnectionSummary, Myo, SessionState, StopReason};
