use tracing::{debug, instrument};

use super::address::DeviceAddress;
use super::link::TransportLink;
use super::packet::{MAX_PAYLOAD_LEN, Opcode, Packet};
use super::stream::ByteStream;
use crate::error::LinkError;
use crate::protocol::AttributeHandle;

/// Bytes preceding the attribute value in `attribute_value` and
/// `procedure_completed` events.
const EVENT_HEADER_LEN: usize = 5;
/// Bytes preceding the value in an `attribute_write` command.
const WRITE_HEADER_LEN: usize = 4;

const DISCOVER_GENERIC: u8 = 0x01;
const ADDRESS_TYPE_PUBLIC: u8 = 0x00;
const CONNECTION_INTERVAL_MIN: u16 = 6;
const CONNECTION_INTERVAL_MAX: u16 = 6;
const SUPERVISION_TIMEOUT: u16 = 64;
const SLAVE_LATENCY: u16 = 0;

/// Whether a write waits for the remote side to confirm completion.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum Confirmation {
    /// Block until `attclient procedure_completed` arrives.
    #[default]
    Await,
    /// Return as soon as the dongle acknowledges the command.
    FireAndForget,
}

/// GATT reads and writes by handle on the active connection, plus the GAP
/// procedures needed to reach one.
#[derive(Debug)]
pub struct AttributeClient<S> {
    link: TransportLink<S>,
    connection: Option<u8>,
}

impl<S: ByteStream> AttributeClient<S> {
    /// Wraps a link with no connection attached.
    pub fn new(link: TransportLink<S>) -> Self {
        Self {
            link,
            connection: None,
        }
    }

    /// Underlying transport link.
    pub fn link(&self) -> &TransportLink<S> {
        &self.link
    }

    /// Mutable access to the transport link.
    pub fn link_mut(&mut self) -> &mut TransportLink<S> {
        &mut self.link
    }

    /// Consumes the client, returning the link.
    pub fn into_link(self) -> TransportLink<S> {
        self.link
    }

    /// Active connection handle, if any.
    #[must_use]
    pub fn connection(&self) -> Option<u8> {
        self.connection
    }

    /// Sets the connection used by attribute operations.
    pub fn attach(&mut self, connection: u8) {
        self.connection = Some(connection);
    }

    /// Clears the active connection, returning it.
    pub fn detach(&mut self) -> Option<u8> {
        self.connection.take()
    }

    /// Reads an attribute value.
    ///
    /// Returns `Ok(None)` without any I/O when no connection is attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    #[instrument(skip(self), level = "debug", fields(%handle))]
    pub fn read_attribute(
        &mut self,
        handle: AttributeHandle,
    ) -> Result<Option<Vec<u8>>, LinkError> {
        let Some(connection) = self.connection else {
            debug!("no connection attached; skipping read");
            return Ok(None);
        };

        let [low, high] = handle.to_le_bytes();
        self.link.send_command(Opcode::ATTCLIENT_READ_BY_HANDLE, &[connection, low, high])?;
        let event = self.link.wait_for(|packet| {
            packet.is_event_for(Opcode::ATTCLIENT_ATTRIBUTE_VALUE)
                && event_matches(packet, connection, Some(handle))
        })?;
        Ok(Some(strip_event_header(&event)))
    }

    /// Writes an attribute value.
    ///
    /// With [`Confirmation::Await`] the returned bytes are the trailing part of
    /// the `procedure_completed` event; with [`Confirmation::FireAndForget`]
    /// they are empty. Returns `Ok(None)` without any I/O when no connection
    /// is attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not fit in one command or the link
    /// fails.
    #[instrument(skip(self, value), level = "debug", fields(%handle, value_len = value.len()))]
    pub fn write_attribute(
        &mut self,
        handle: AttributeHandle,
        value: &[u8],
        confirmation: Confirmation,
    ) -> Result<Option<Vec<u8>>, LinkError> {
        let Some(connection) = self.connection else {
            debug!("no connection attached; skipping write");
            return Ok(None);
        };

        let max = MAX_PAYLOAD_LEN - WRITE_HEADER_LEN;
        if value.len() > max {
            return Err(LinkError::PayloadTooLarge {
                len: value.len(),
                max,
            });
        }

        let [low, high] = handle.to_le_bytes();
        let mut payload = Vec::with_capacity(WRITE_HEADER_LEN + value.len());
        payload.extend_from_slice(&[connection, low, high, value.len() as u8]);
        payload.extend_from_slice(value);
        self.link.send_command(Opcode::ATTCLIENT_ATTRIBUTE_WRITE, &payload)?;

        match confirmation {
            Confirmation::FireAndForget => Ok(Some(Vec::new())),
            Confirmation::Await => {
                let event = self.link.wait_for(|packet| {
                    packet.is_event_for(Opcode::ATTCLIENT_PROCEDURE_COMPLETED)
                        && event_matches(packet, connection, None)
                })?;
                Ok(Some(strip_event_header(&event)))
            }
        }
    }

    /// Stops any running GAP procedure.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    pub fn end_procedure(&mut self) -> Result<Packet, LinkError> {
        self.link.send_command(Opcode::GAP_END_PROCEDURE, &[])
    }

    /// Starts generic discovery; scan responses arrive as events.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    pub fn discover(&mut self) -> Result<Packet, LinkError> {
        self.link.send_command(Opcode::GAP_DISCOVER, &[DISCOVER_GENERIC])
    }

    /// Requests a direct connection to `address`.
    ///
    /// The connection handle is the last byte of the returned response.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    #[instrument(skip(self), level = "debug", fields(%address))]
    pub fn connect_direct(&mut self, address: DeviceAddress) -> Result<Packet, LinkError> {
        let mut payload = Vec::with_capacity(15);
        payload.extend_from_slice(&address.to_wire());
        payload.push(ADDRESS_TYPE_PUBLIC);
        payload.extend_from_slice(&CONNECTION_INTERVAL_MIN.to_le_bytes());
        payload.extend_from_slice(&CONNECTION_INTERVAL_MAX.to_le_bytes());
        payload.extend_from_slice(&SUPERVISION_TIMEOUT.to_le_bytes());
        payload.extend_from_slice(&SLAVE_LATENCY.to_le_bytes());
        self.link.send_command(Opcode::GAP_CONNECT_DIRECT, &payload)
    }

    /// Requests that the dongle drop `connection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    pub fn disconnect(&mut self, connection: u8) -> Result<Packet, LinkError> {
        self.link.send_command(Opcode::CONNECTION_DISCONNECT, &[connection])
    }

    /// Queries how many connections the dongle supports.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    pub fn get_connections(&mut self) -> Result<Packet, LinkError> {
        self.link.send_command(Opcode::SYSTEM_GET_CONNECTIONS, &[])
    }
}

fn event_matches(packet: &Packet, connection: u8, handle: Option<AttributeHandle>) -> bool {
    let payload = packet.payload();
    if payload.first() != Some(&connection) {
        return false;
    }
    match handle {
        Some(handle) => payload.get(1..3) == Some(&handle.to_le_bytes()[..]),
        None => true,
    }
}

fn strip_event_header(packet: &Packet) -> Vec<u8> {
    packet
        .payload()
        .get(EVENT_HEADER_LEN..)
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}
