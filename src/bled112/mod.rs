mod address;
mod attribute;
mod fake;
mod framer;
mod link;
mod packet;
mod stream;

pub use address::{ADDRESS_LEN, DeviceAddress};
pub use attribute::{AttributeClient, Confirmation};
pub use fake::{
    FakeAdvertisement, FakeDongle, FakeDongleConfig, FakeDongleLog, FakeNotifications,
};
pub use framer::Framer;
pub use link::{ListenerId, PacketListener, TransportLink};
pub use packet::{HEADER_LEN, MAX_PAYLOAD_LEN, Opcode, Packet, PacketKind};
pub use stream::{
    ByteStream, DONGLE_USB_PID, DONGLE_USB_VID, DongleConfig, MemoryStream, SerialStream,
    detect_dongle_port,
};
