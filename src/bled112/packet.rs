use std::fmt;

use strum_macros::{Display, EnumIter, FromRepr};

use crate::error::LinkError;
use crate::utils::format_hex;

/// Length of the fixed BGAPI header preceding every payload.
pub const HEADER_LEN: usize = 4;

/// Largest payload a command frame can carry in its length byte.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Packet type encoded in the first header byte.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, FromRepr)]
#[repr(u8)]
pub enum PacketKind {
    /// Direct response to a BLE command.
    #[strum(to_string = "ble_response")]
    BleResponse = 0x00,
    /// Unsolicited BLE event.
    #[strum(to_string = "ble_event")]
    BleEvent = 0x80,
    /// Direct response on the Wi-Fi channel.
    #[strum(to_string = "wifi_response")]
    WifiResponse = 0x08,
    /// Unsolicited event on the Wi-Fi channel.
    #[strum(to_string = "wifi_event")]
    WifiEvent = 0x88,
}

impl PacketKind {
    /// Parses a header type byte, returning `None` for unrecognised values.
    #[must_use]
    pub fn from_header(byte: u8) -> Option<Self> {
        Self::from_repr(byte)
    }

    /// Returns the raw header byte.
    #[must_use]
    pub fn header_byte(self) -> u8 {
        self as u8
    }

    /// Returns whether this packet answers a command.
    #[must_use]
    pub fn is_response(self) -> bool {
        matches!(self, Self::BleResponse | Self::WifiResponse)
    }

    /// Returns whether this packet was pushed by the dongle unprompted.
    #[must_use]
    pub fn is_event(self) -> bool {
        !self.is_response()
    }
}

/// A BGAPI message class and command identifier pair.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Opcode {
    class_id: u8,
    command_id: u8,
}

impl Opcode {
    /// `system get_connections` command.
    pub const SYSTEM_GET_CONNECTIONS: Self = Self::new(0x00, 0x06);
    /// `connection disconnect` command.
    pub const CONNECTION_DISCONNECT: Self = Self::new(0x03, 0x00);
    /// `connection status` event.
    pub const CONNECTION_STATUS: Self = Self::new(0x03, 0x00);
    /// `attclient procedure_completed` event.
    pub const ATTCLIENT_PROCEDURE_COMPLETED: Self = Self::new(0x04, 0x01);
    /// `attclient read_by_handle` command.
    pub const ATTCLIENT_READ_BY_HANDLE: Self = Self::new(0x04, 0x04);
    /// `attclient attribute_write` command.
    pub const ATTCLIENT_ATTRIBUTE_WRITE: Self = Self::new(0x04, 0x05);
    /// `attclient attribute_value` event.
    pub const ATTCLIENT_ATTRIBUTE_VALUE: Self = Self::new(0x04, 0x05);
    /// `gap scan_response` event.
    pub const GAP_SCAN_RESPONSE: Self = Self::new(0x06, 0x00);
    /// `gap discover` command.
    pub const GAP_DISCOVER: Self = Self::new(0x06, 0x02);
    /// `gap connect_direct` command.
    pub const GAP_CONNECT_DIRECT: Self = Self::new(0x06, 0x03);
    /// `gap end_procedure` command.
    pub const GAP_END_PROCEDURE: Self = Self::new(0x06, 0x04);

    /// Creates an opcode from raw identifiers.
    #[must_use]
    pub const fn new(class_id: u8, command_id: u8) -> Self {
        Self {
            class_id,
            command_id,
        }
    }

    /// Message class identifier.
    #[must_use]
    pub const fn class_id(self) -> u8 {
        self.class_id
    }

    /// Command identifier within the class.
    #[must_use]
    pub const fn command_id(self) -> u8 {
        self.command_id
    }
}

/// One complete BGAPI packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    kind: PacketKind,
    opcode: Opcode,
    payload: Vec<u8>,
}

impl Packet {
    /// Creates a packet from its parts.
    #[must_use]
    pub fn new(kind: PacketKind, opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            kind,
            opcode,
            payload,
        }
    }

    /// Builds a packet from a complete frame.
    ///
    /// Returns `None` when the header type is not recognised or the frame is
    /// shorter than the fixed header.
    pub(crate) fn from_frame(frame: &[u8]) -> Option<Self> {
        if frame.len() < HEADER_LEN {
            return None;
        }
        let kind = PacketKind::from_header(frame[0])?;
        Some(Self::new(
            kind,
            Opcode::new(frame[2], frame[3]),
            frame[HEADER_LEN..].to_vec(),
        ))
    }

    /// Packet type.
    #[must_use]
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// Class and command identifiers.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Message class identifier.
    #[must_use]
    pub fn class_id(&self) -> u8 {
        self.opcode.class_id()
    }

    /// Command identifier.
    #[must_use]
    pub fn command_id(&self) -> u8 {
        self.opcode.command_id()
    }

    /// Packet payload following the header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns whether this is a BLE event carrying the given opcode.
    #[must_use]
    pub fn is_event_for(&self, opcode: Opcode) -> bool {
        self.kind == PacketKind::BleEvent && self.opcode == opcode
    }

    /// Serialises the packet back into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::PayloadTooLarge`] when the payload does not fit in
    /// the single length byte the recognised header types carry.
    pub fn to_frame(&self) -> Result<Vec<u8>, LinkError> {
        let len = u8::try_from(self.payload.len()).map_err(|_| LinkError::PayloadTooLarge {
            len: self.payload.len(),
            max: MAX_PAYLOAD_LEN,
        })?;
        let mut frame = Vec::with_capacity(HEADER_LEN + self.payload.len());
        frame.push(self.kind.header_byte());
        frame.push(len);
        frame.push(self.class_id());
        frame.push(self.command_id());
        frame.extend_from_slice(&self.payload);
        Ok(frame)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet({:02X}, {:02X}, {:02X}, [{}])",
            self.kind.header_byte(),
            self.class_id(),
            self.command_id(),
            format_hex(&self.payload),
        )
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[rstest]
    #[case(0x00, Some(PacketKind::BleResponse))]
    #[case(0x80, Some(PacketKind::BleEvent))]
    #[case(0x08, Some(PacketKind::WifiResponse))]
    #[case(0x88, Some(PacketKind::WifiEvent))]
    #[case(0x01, None)]
    #[case(0xFF, None)]
    fn from_header_recognises_only_known_types(
        #[case] byte: u8,
        #[case] expected: Option<PacketKind>,
    ) {
        assert_eq!(expected, PacketKind::from_header(byte));
    }

    #[test]
    fn response_and_event_kinds_partition_the_header_types() {
        for kind in PacketKind::iter() {
            assert_eq!(!kind.is_response(), kind.is_event());
        }
    }

    #[test]
    fn is_event_for_matches_ble_events_only() {
        let opcode = Opcode::CONNECTION_STATUS;
        for kind in PacketKind::iter() {
            let packet = Packet::new(kind, opcode, Vec::new());
            assert_eq!(kind == PacketKind::BleEvent, packet.is_event_for(opcode));
        }
    }

    #[test]
    fn display_renders_uppercase_fields() {
        let packet = Packet::new(
            PacketKind::BleEvent,
            Opcode::ATTCLIENT_ATTRIBUTE_VALUE,
            vec![0x00, 0x27, 0x00],
        );
        assert_eq!("Packet(80, 04, 05, [00 27 00])", packet.to_string());
    }

    #[test]
    fn to_frame_writes_header_then_payload() -> Result<(), LinkError> {
        let packet = Packet::new(
            PacketKind::BleResponse,
            Opcode::GAP_END_PROCEDURE,
            vec![0x00, 0x00],
        );
        assert_eq!(vec![0x00, 0x02, 0x06, 0x04, 0x00, 0x00], packet.to_frame()?);
        Ok(())
    }

    #[test]
    fn to_frame_accepts_a_full_length_byte() -> Result<(), LinkError> {
        let packet = Packet::new(
            PacketKind::BleEvent,
            Opcode::ATTCLIENT_ATTRIBUTE_VALUE,
            vec![0xAB; MAX_PAYLOAD_LEN],
        );

        let frame = packet.to_frame()?;

        assert_eq!(HEADER_LEN + MAX_PAYLOAD_LEN, frame.len());
        assert_eq!(0xFF, frame[1]);
        Ok(())
    }

    #[test]
    fn to_frame_rejects_payloads_beyond_one_length_byte() {
        let packet = Packet::new(
            PacketKind::BleResponse,
            Opcode::ATTCLIENT_ATTRIBUTE_WRITE,
            vec![0x00; MAX_PAYLOAD_LEN + 1],
        );

        assert_matches!(
            packet.to_frame(),
            Err(LinkError::PayloadTooLarge { len: 256, max: 255 })
        );
    }

    #[test]
    fn from_frame_rejects_truncated_header() {
        assert_eq!(None, Packet::from_frame(&[0x80, 0x00, 0x04]));
    }
}
