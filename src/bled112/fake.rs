use std::collections::{HashMap, VecDeque};
use std::io;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::address::DeviceAddress;
use super::framer::Framer;
use super::packet::{Opcode, Packet, PacketKind};
use super::stream::ByteStream;
use crate::error::FixtureError;
use crate::protocol::{Attribute, AttributeHandle, AttributeWrite, MYO_SERVICE_ID};

const DEFAULT_ADDRESS: DeviceAddress = DeviceAddress::new([0xc0, 0xff, 0xee, 0x00, 0x00, 0x01]);
const DEFAULT_FIRMWARE: [u16; 4] = [1, 5, 1970, 2];
const DEFAULT_NAME: &str = "Simulated Myo";
const DEFAULT_BATTERY_LEVEL: u8 = 87;
const DEFAULT_RSSI: i8 = -58;
const MAX_CONNECTIONS: u8 = 3;
const ATTRIBUTE_VALUE_READ: u8 = 0x00;
const ATTRIBUTE_VALUE_NOTIFY: u8 = 0x01;
const DEEP_SLEEP_COMMAND: [u8; 2] = [0x04, 0x00];
const SUCCESS: [u8; 2] = [0x00, 0x00];

/// A peripheral the simulated dongle reports while discovering.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FakeAdvertisement {
    address: DeviceAddress,
    is_myo: bool,
}

impl FakeAdvertisement {
    /// A Myo advertising its service identifier.
    #[must_use]
    pub fn myo(address: DeviceAddress) -> Self {
        Self {
            address,
            is_myo: true,
        }
    }

    /// Some other peripheral that does not advertise the Myo service.
    #[must_use]
    pub fn other(address: DeviceAddress) -> Self {
        Self {
            address,
            is_myo: false,
        }
    }

    fn scan_response(self) -> Packet {
        let mut data = vec![0x02, 0x01, 0x06, 0x11, 0x07];
        if self.is_myo {
            data.extend_from_slice(&MYO_SERVICE_ID);
        } else {
            data.extend_from_slice(&[0x00; 16]);
        }

        let mut payload = vec![DEFAULT_RSSI as u8, 0x00];
        payload.extend_from_slice(&self.address.to_wire());
        payload.extend_from_slice(&[0x00, 0xff, data.len() as u8]);
        payload.extend_from_slice(&data);
        event(Opcode::GAP_SCAN_RESPONSE, payload)
    }
}

/// Notification fixtures in the form `handle:hexvalue,handle:hexvalue`.
///
/// Handles are hexadecimal with an optional `0x` prefix.
#[derive(Debug, Clone, Default, Eq, PartialEq, derive_more::Into)]
pub struct FakeNotifications {
    notifications: Vec<(AttributeHandle, Vec<u8>)>,
}

impl FromStr for FakeNotifications {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let notifications = value
            .split(',')
            .map(str::trim)
            .filter(|record| !record.is_empty())
            .map(parse_notification)
            .collect::<Result<_, _>>()?;
        Ok(Self { notifications })
    }
}

fn parse_notification(record: &str) -> Result<(AttributeHandle, Vec<u8>), FixtureError> {
    let Some((handle, payload)) = record.split_once(':') else {
        return Err(FixtureError::InvalidNotificationRecord {
            value: record.to_string(),
        });
    };
    let digits = handle.trim().trim_start_matches("0x");
    let handle = u16::from_str_radix(digits, 16).map_err(|_| FixtureError::InvalidHandle {
        value: handle.to_string(),
    })?;
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    Ok((AttributeHandle::new(handle), hex::decode(cleaned)?))
}

/// Settings for the simulated dongle and armband.
#[derive(Debug, Clone, Builder)]
pub struct FakeDongleConfig {
    /// Peripherals reported in discovery order.
    #[builder(default = vec![FakeAdvertisement::myo(DEFAULT_ADDRESS)])]
    advertisements: Vec<FakeAdvertisement>,
    /// Firmware version as major, minor, patch, hardware revision.
    #[builder(default = DEFAULT_FIRMWARE)]
    firmware: [u16; 4],
    #[builder(default = DEFAULT_NAME.to_string(), into)]
    name: String,
    #[builder(default = DEFAULT_BATTERY_LEVEL)]
    battery_level: u8,
    /// Connection handle handed out by `connect_direct`.
    #[builder(default)]
    connection: u8,
    /// Notifications sent once the host switches streaming on.
    #[builder(default)]
    notifications: Vec<(AttributeHandle, Vec<u8>)>,
}

impl Default for FakeDongleConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Commands and attribute writes observed by a [`FakeDongle`].
#[derive(Debug, Clone, Default)]
pub struct FakeDongleLog {
    commands: Vec<Packet>,
    writes: Vec<AttributeWrite>,
}

impl FakeDongleLog {
    /// Every command packet received, in order.
    #[must_use]
    pub fn commands(&self) -> &[Packet] {
        &self.commands
    }

    /// Every attribute write received, in order.
    #[must_use]
    pub fn writes(&self) -> &[AttributeWrite] {
        &self.writes
    }

    /// Values written to `handle`, in order.
    #[must_use]
    pub fn writes_to(&self, handle: AttributeHandle) -> Vec<&[u8]> {
        self.writes
            .iter()
            .filter(|write| write.handle() == handle)
            .map(AttributeWrite::value)
            .collect()
    }
}

/// A simulated BLED112 with one Myo in range.
///
/// Commands written by the host are answered immediately; reads drain the
/// queued replies and report the stream closed once nothing is left.
#[derive(Debug)]
pub struct FakeDongle {
    config: FakeDongleConfig,
    framer: Framer,
    outgoing: VecDeque<u8>,
    attributes: HashMap<AttributeHandle, Vec<u8>>,
    connected: Option<u8>,
    streaming: bool,
    log: Arc<Mutex<FakeDongleLog>>,
}

impl FakeDongle {
    /// Creates a dongle simulating `config`.
    #[must_use]
    pub fn new(config: FakeDongleConfig) -> Self {
        let firmware: Vec<u8> = config
            .firmware
            .iter()
            .flat_map(|part| part.to_le_bytes())
            .collect();
        let attributes = HashMap::from([
            (Attribute::DeviceName.handle(), config.name.as_bytes().to_vec()),
            (Attribute::BatteryLevel.handle(), vec![config.battery_level]),
            (Attribute::FirmwareVersion.handle(), firmware),
        ]);

        Self {
            config,
            framer: Framer::new(),
            outgoing: VecDeque::new(),
            attributes,
            connected: None,
            streaming: false,
            log: Arc::default(),
        }
    }

    /// Shared handle to the command log, usable after the dongle is moved.
    #[must_use]
    pub fn log(&self) -> Arc<Mutex<FakeDongleLog>> {
        Arc::clone(&self.log)
    }

    fn handle_command(&mut self, command: Packet) {
        trace!(packet = %command, "fake dongle received command");
        self.log.lock().commands.push(command.clone());
        let payload = command.payload();

        match command.opcode() {
            Opcode::GAP_END_PROCEDURE => self.respond(command.opcode(), SUCCESS.to_vec()),
            Opcode::GAP_DISCOVER => {
                self.respond(command.opcode(), SUCCESS.to_vec());
                for advertisement in self.config.advertisements.clone() {
                    self.send(advertisement.scan_response());
                }
            }
            Opcode::GAP_CONNECT_DIRECT => self.connect(payload),
            Opcode::CONNECTION_DISCONNECT => {
                let connection = payload.first().copied().unwrap_or_default();
                if self.connected == Some(connection) {
                    debug!(connection, "fake dongle dropping connection");
                    self.connected = None;
                }
                self.respond(command.opcode(), vec![connection, 0x00, 0x00]);
            }
            Opcode::SYSTEM_GET_CONNECTIONS => self.respond(command.opcode(), vec![MAX_CONNECTIONS]),
            Opcode::ATTCLIENT_READ_BY_HANDLE => self.read(payload),
            Opcode::ATTCLIENT_ATTRIBUTE_WRITE => self.write(payload),
            opcode => {
                debug!(?opcode, "fake dongle ignoring unsupported command");
                self.respond(opcode, SUCCESS.to_vec());
            }
        }
    }

    fn connect(&mut self, payload: &[u8]) {
        let connection = self.config.connection;
        self.connected = Some(connection);
        let mut result = SUCCESS.to_vec();
        result.push(connection);
        self.respond(Opcode::GAP_CONNECT_DIRECT, result);

        let mut status = vec![connection, 0x05];
        status.extend_from_slice(payload.get(..6).unwrap_or(&[0; 6]));
        status.extend_from_slice(&[0x00, 0x06, 0x00, 0x40, 0x00, 0x00, 0x00, 0xff]);
        self.send(event(Opcode::CONNECTION_STATUS, status));
    }

    fn read(&mut self, payload: &[u8]) {
        let connection = payload.first().copied().unwrap_or_default();
        let handle = handle_at(payload, 1);
        self.respond(Opcode::ATTCLIENT_READ_BY_HANDLE, vec![connection, 0x00, 0x00]);

        let value = self.attributes.get(&handle).cloned().unwrap_or_default();
        self.send(attribute_value(connection, handle, ATTRIBUTE_VALUE_READ, &value));
    }

    fn write(&mut self, payload: &[u8]) {
        let connection = payload.first().copied().unwrap_or_default();
        let handle = handle_at(payload, 1);
        let value = payload.get(4..).unwrap_or_default().to_vec();
        self.log
            .lock()
            .writes
            .push(AttributeWrite::new(handle, value.clone()));
        self.respond(
            Opcode::ATTCLIENT_ATTRIBUTE_WRITE,
            vec![connection, 0x00, 0x00],
        );

        if handle == Attribute::Command.handle() && value == DEEP_SLEEP_COMMAND {
            debug!("fake armband entering deep sleep");
            self.connected = None;
            return;
        }

        let [low, high] = handle.to_le_bytes();
        self.send(event(
            Opcode::ATTCLIENT_PROCEDURE_COMPLETED,
            vec![connection, 0x00, 0x00, low, high],
        ));

        if handle == Attribute::Command.handle() && starts_streaming(&value) {
            self.start_streaming(connection);
        } else {
            self.attributes.insert(handle, value);
        }
    }

    fn start_streaming(&mut self, connection: u8) {
        if self.streaming {
            return;
        }
        self.streaming = true;
        for (handle, value) in self.config.notifications.clone() {
            self.send(attribute_value(connection, handle, ATTRIBUTE_VALUE_NOTIFY, &value));
        }
    }

    fn respond(&mut self, opcode: Opcode, payload: Vec<u8>) {
        self.send(Packet::new(PacketKind::BleResponse, opcode, payload));
    }

    fn send(&mut self, packet: Packet) {
        match packet.to_frame() {
            Ok(frame) => self.outgoing.extend(frame),
            Err(error) => warn!(%error, %packet, "fake dongle dropping unframeable packet"),
        }
    }
}

impl ByteStream for FakeDongle {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        for command in self.framer.feed_all(bytes) {
            self.handle_command(command);
        }
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Option<Duration>) -> io::Result<Option<u8>> {
        Ok(self.outgoing.pop_front())
    }

    fn is_closed(&self) -> bool {
        self.outgoing.is_empty()
    }
}

/// Returns whether a command characteristic write switches data streaming on.
fn starts_streaming(value: &[u8]) -> bool {
    matches!(value, [0x01, 0x03, ..] | [0x02, 0x09, ..])
}

fn handle_at(payload: &[u8], offset: usize) -> AttributeHandle {
    let low = payload.get(offset).copied().unwrap_or_default();
    let high = payload.get(offset + 1).copied().unwrap_or_default();
    AttributeHandle::new(u16::from_le_bytes([low, high]))
}

fn event(opcode: Opcode, payload: Vec<u8>) -> Packet {
    Packet::new(PacketKind::BleEvent, opcode, payload)
}

fn attribute_value(connection: u8, handle: AttributeHandle, kind: u8, value: &[u8]) -> Packet {
    let [low, high] = handle.to_le_bytes();
    let mut payload = vec![connection, low, high, kind, value.len() as u8];
    payload.extend_from_slice(value);
    event(Opcode::ATTCLIENT_ATTRIBUTE_VALUE, payload)
}
