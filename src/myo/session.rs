use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use strum_macros::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::commands::{
    self, Rgb, SleepMode, Vibration, deep_sleep_payload, leds_payload, sleep_mode_payload,
    vibrate_payload,
};
use super::decode::{Notification, decode_notification};
use super::events::{DataCategory, MyoEvent};
use super::firmware::{FirmwareVersion, ProtocolVariant, SubscribeOptions};
use super::registry::{EventHandler, HandlerRegistry};
use crate::bled112::{
    AttributeClient, ByteStream, Confirmation, DeviceAddress, DongleConfig, ListenerId, Opcode,
    Packet, PacketListener, SerialStream, TransportLink,
};
use crate::error::{DecodeError, HandlerError, LinkError, MyoError};
use crate::protocol::{Attribute, AttributeHandle, MYO_SERVICE_ID};
use crate::utils::format_hex;

/// Connection handles the dongle may still hold from an earlier session.
const STALE_CONNECTIONS: [u8; 3] = [0, 1, 2];
const ADDRESS_OFFSET: usize = 2;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Scanning,
    Connected,
    Subscribed,
}

/// Why [`Myo::run_until`] returned.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    StreamClosed,
}

/// Details of an established armband connection.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ConnectionSummary {
    pub address: DeviceAddress,
    pub connection: u8,
    pub firmware: FirmwareVersion,
    pub protocol: ProtocolVariant,
}

/// A Myo armband session over a BLED112 dongle.
///
/// Handlers registered per [`DataCategory`] receive decoded events while the
/// session is polled. They run on the polling thread and never see the
/// session itself.
pub struct Myo<S = SerialStream> {
    client: AttributeClient<S>,
    registry: Arc<Mutex<HandlerRegistry>>,
    decoder: Option<ListenerId>,
    state: SessionState,
    address: Option<DeviceAddress>,
    firmware: Option<FirmwareVersion>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Myo<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Myo")
            .field("client", &self.client)
            .field("state", &self.state)
            .field("address", &self.address)
            .field("firmware", &self.firmware)
            .finish_non_exhaustive()
    }
}

impl Myo<SerialStream> {
    /// Opens the dongle described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if no dongle is found or its port cannot be opened.
    pub fn open(config: &DongleConfig) -> Result<Self, MyoError> {
        Ok(Self::new(SerialStream::open(config)?))
    }
}

impl<S: ByteStream> Myo<S> {
    /// Creates a disconnected session over `stream`.
    pub fn new(stream: S) -> Self {
        let mut myo = Self {
            client: AttributeClient::new(TransportLink::new(stream)),
            registry: Arc::default(),
            decoder: None,
            state: SessionState::Disconnected,
            address: None,
            firmware: None,
        };
        myo.install_decoder();
        myo
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Address of the connected armband.
    #[must_use]
    pub fn address(&self) -> Option<DeviceAddress> {
        self.address
    }

    /// Firmware version read after connecting.
    #[must_use]
    pub fn firmware_version(&self) -> Option<FirmwareVersion> {
        self.firmware
    }

    /// Protocol variant selected from the firmware version.
    #[must_use]
    pub fn protocol(&self) -> Option<ProtocolVariant> {
        self.firmware.map(FirmwareVersion::variant)
    }

    /// Dongle connection handle, if connected.
    #[must_use]
    pub fn connection(&self) -> Option<u8> {
        self.client.connection()
    }

    /// Underlying byte stream.
    pub fn stream(&self) -> &S {
        self.client.link().stream()
    }

    /// Mutable access to the underlying byte stream.
    pub fn stream_mut(&mut self) -> &mut S {
        self.client.link_mut().stream_mut()
    }

    /// Registers `handler` for events of `category`.
    pub fn add_handler<F>(&mut self, category: DataCategory, handler: F)
    where
        F: FnMut(&MyoEvent) -> Result<(), HandlerError> + Send + 'static,
    {
        self.registry.lock().add(category, handler);
    }

    /// Removes and returns the handler of `category` at `index`.
    pub fn pop_handler(&mut self, category: DataCategory, index: usize) -> Option<EventHandler> {
        self.registry.lock().pop(category, index)
    }

    /// Removes and returns the most recent handler of `category`.
    pub fn pop_last_handler(&mut self, category: DataCategory) -> Option<EventHandler> {
        self.registry.lock().pop_last(category)
    }

    /// Removes every handler of `category`.
    pub fn clear_handlers(&mut self, category: DataCategory) {
        self.registry.lock().clear(category);
    }

    /// Number of handlers registered for `category`.
    #[must_use]
    pub fn handler_count(&self, category: DataCategory) -> usize {
        self.registry.lock().len(category)
    }

    /// Discovers advertisements until a device offering `service_id` is found.
    ///
    /// Any running GAP procedure and stale connections are terminated first,
    /// leaving the session with no attached connection.
    /// With a `filter`, only that address ends the scan. Blocks until a
    /// matching device advertises.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails or closes.
    #[instrument(skip(self, service_id), level = "debug")]
    pub fn scan(
        &mut self,
        service_id: &[u8],
        filter: Option<DeviceAddress>,
    ) -> Result<DeviceAddress, MyoError> {
        self.client.end_procedure()?;
        for connection in STALE_CONNECTIONS {
            self.client.disconnect(connection)?;
        }
        if let Some(connection) = self.client.detach() {
            debug!(connection, "detached connection dropped before scanning");
        }
        self.address = None;
        self.firmware = None;

        info!("scanning for armbands");
        self.state = SessionState::Scanning;
        self.client.discover()?;

        let address = loop {
            let Some(packet) = self.client.link_mut().recv_packet(None)? else {
                self.state = SessionState::Disconnected;
                return Err(LinkError::StreamClosed.into());
            };
            let Some(address) = advertised_address(&packet, service_id) else {
                continue;
            };
            info!(%address, "found armband");
            if filter.is_none_or(|wanted| wanted == address) {
                break address;
            }
        };

        self.client.end_procedure()?;
        self.state = SessionState::Disconnected;
        info!(%address, "selected armband");
        Ok(address)
    }

    /// Connects to `address` and waits for the connection to come up.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails or the dongle reports no handle.
    #[instrument(skip(self), level = "debug", fields(%address))]
    pub fn connect(&mut self, address: DeviceAddress) -> Result<u8, MyoError> {
        self.install_decoder();
        let response = self.client.connect_direct(address)?;
        let Some(&connection) = response.payload().last() else {
            return Err(MyoError::MissingConnectionHandle);
        };
        self.client.attach(connection);
        self.client.link_mut().wait_event(Opcode::CONNECTION_STATUS)?;

        self.address = Some(address);
        self.state = SessionState::Connected;
        info!(connection, "connected");
        Ok(connection)
    }

    /// Reads the firmware version and selects the protocol variant.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected, the link fails, or the attribute is
    /// malformed.
    #[instrument(skip(self), level = "debug")]
    pub fn read_version(&mut self) -> Result<FirmwareVersion, MyoError> {
        let handle = Attribute::FirmwareVersion.handle();
        let bytes = self.client.read_attribute(handle)?.ok_or(MyoError::NotConnected)?;
        let version =
            FirmwareVersion::from_le_bytes(&bytes).ok_or(MyoError::MalformedAttribute {
                handle,
                expected: 8,
                actual: bytes.len(),
            })?;

        info!(%version, protocol = %version.variant(), "read firmware version");
        self.firmware = Some(version);
        Ok(version)
    }

    /// Enables streaming according to the firmware's protocol variant.
    ///
    /// # Errors
    ///
    /// Returns an error if the firmware version has not been read, the
    /// connection is gone, or the link fails.
    #[instrument(skip(self), level = "debug")]
    pub fn subscribe(&mut self, options: &SubscribeOptions) -> Result<(), MyoError> {
        let variant = self.protocol().ok_or(MyoError::NotConnected)?;
        self.install_decoder();

        for write in variant.subscription_plan(options) {
            self.client
                .write_attribute(write.handle(), write.value(), Confirmation::Await)?
                .ok_or(MyoError::NotConnected)?;
        }

        self.state = SessionState::Subscribed;
        info!(%variant, "subscribed to armband data");
        Ok(())
    }

    /// Scans, connects, reads the firmware version and subscribes.
    ///
    /// On modern firmware the device name and battery level are logged before
    /// subscribing.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn connect_first(
        &mut self,
        filter: Option<DeviceAddress>,
        options: &SubscribeOptions,
    ) -> Result<ConnectionSummary, MyoError> {
        let address = self.scan(&MYO_SERVICE_ID, filter)?;
        let connection = self.connect(address)?;
        let firmware = self.read_version()?;

        if firmware.variant() == ProtocolVariant::Modern {
            let name = self.get_name()?;
            let battery_level = self.get_battery_level()?;
            info!(?name, ?battery_level, "armband status");
        }

        self.subscribe(options)?;
        Ok(ConnectionSummary {
            address,
            connection,
            firmware,
            protocol: firmware.variant(),
        })
    }

    /// Sets whether the armband may sleep while idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    pub fn set_sleep_mode(&mut self, mode: SleepMode) -> Result<(), MyoError> {
        self.command(&sleep_mode_payload(mode), Confirmation::Await)
    }

    /// Pulses the vibration motor.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    pub fn vibrate(&mut self, vibration: Vibration) -> Result<(), MyoError> {
        self.command(&vibrate_payload(vibration), Confirmation::Await)
    }

    /// Sets the logo and bar LED colours.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    pub fn set_leds(&mut self, logo: Rgb, line: Rgb) -> Result<(), MyoError> {
        self.command(&leds_payload(logo, line), Confirmation::Await)
    }

    /// Puts the armband into deep sleep; only USB charging wakes it.
    ///
    /// The armband drops the link without confirming, so this does not wait
    /// for the write to complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    pub fn deep_sleep(&mut self) -> Result<(), MyoError> {
        self.command(&deep_sleep_payload(), Confirmation::FireAndForget)
    }

    /// Renames the armband.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is too long or the link fails.
    pub fn set_name(&mut self, name: &str) -> Result<(), MyoError> {
        let value = commands::name_payload(name)?;
        self.client.write_attribute(Attribute::DeviceName.handle(), value, Confirmation::Await)?;
        Ok(())
    }

    /// Reads the armband name, or `None` when not connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails or the name is not UTF-8.
    pub fn get_name(&mut self) -> Result<Option<String>, MyoError> {
        self.client
            .read_attribute(Attribute::DeviceName.handle())?
            .map(String::from_utf8)
            .transpose()
            .map_err(MyoError::from)
    }

    /// Reads the battery percentage, or `None` when not connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails or the value is malformed.
    pub fn get_battery_level(&mut self) -> Result<Option<u8>, MyoError> {
        let handle = Attribute::BatteryLevel.handle();
        let Some(bytes) = self.client.read_attribute(handle)? else {
            return Ok(None);
        };
        match bytes.as_slice() {
            [level] => Ok(Some(*level)),
            _ => Err(MyoError::MalformedAttribute {
                handle,
                expected: 1,
                actual: bytes.len(),
            }),
        }
    }

    /// Waits up to `timeout` (forever when `None`) for one packet, dispatching
    /// any decoded events.
    ///
    /// # Errors
    ///
    /// Returns an error if the link or a handler fails.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Option<Packet>, MyoError> {
        Ok(self.client.link_mut().recv_packet(timeout)?)
    }

    /// Polls in `interval` slices until `cancel` fires or the stream closes.
    ///
    /// Cancellation is checked between polls.
    ///
    /// # Errors
    ///
    /// Returns an error if the link or a handler fails.
    pub fn run_until(
        &mut self,
        cancel: &CancellationToken,
        interval: Duration,
    ) -> Result<StopReason, MyoError> {
        while !cancel.is_cancelled() {
            if self.poll(Some(interval))?.is_none() && self.stream().is_closed() {
                debug!("byte stream closed");
                return Ok(StopReason::StreamClosed);
            }
        }
        Ok(StopReason::Cancelled)
    }

    /// Drops every listener and handler, then disconnects.
    ///
    /// Calling this again, or before connecting, does nothing further.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails.
    #[instrument(skip(self), level = "debug")]
    pub fn disconnect(&mut self) -> Result<(), MyoError> {
        self.client.link_mut().clear_listeners();
        self.decoder = None;
        self.registry.lock().clear_all();
        self.state = SessionState::Disconnected;

        if let Some(connection) = self.client.detach() {
            self.client.disconnect(connection)?;
            info!(connection, "disconnected");
        }
        Ok(())
    }

    /// Disconnects and releases the byte stream.
    ///
    /// # Errors
    ///
    /// Returns an error if disconnecting fails; the stream is released either
    /// way.
    pub fn close(mut self) -> Result<(), MyoError> {
        self.disconnect()
    }

    fn command(&mut self, value: &[u8], confirmation: Confirmation) -> Result<(), MyoError> {
        self.client.write_attribute(Attribute::Command.handle(), value, confirmation)?;
        Ok(())
    }

    fn install_decoder(&mut self) {
        if self.decoder.is_none() {
            let listener = notification_listener(Arc::clone(&self.registry));
            self.decoder = Some(self.client.link_mut().add_listener(listener));
        }
    }
}

/// Address of the advertiser if `packet` advertises `service_id`.
fn advertised_address(packet: &Packet, service_id: &[u8]) -> Option<DeviceAddress> {
    let payload = packet.payload();
    if !packet.kind().is_event() || !payload.ends_with(service_id) {
        return None;
    }
    DeviceAddress::from_wire(payload.get(ADDRESS_OFFSET..ADDRESS_OFFSET + 6)?)
}

fn notification_listener(registry: Arc<Mutex<HandlerRegistry>>) -> PacketListener {
    Box::new(move |packet: &Packet| {
        let Some(notification) = Notification::from_packet(packet) else {
            return Ok(());
        };

        let events = match decode_notification(notification.handle, notification.value) {
            Ok(events) => events,
            Err(DecodeError::UnknownHandle { handle }) => {
                log_undecoded(handle, notification.value);
                return Ok(());
            }
            Err(error) => {
                warn!(%error, "dropping malformed notification");
                return Ok(());
            }
        };

        let mut registry = registry.lock();
        for event in &events {
            registry.dispatch(event)?;
        }
        Ok(())
    })
}

fn log_undecoded(handle: AttributeHandle, value: &[u8]) {
    let value = format_hex(value);
    if handle.attribute().is_some() {
        debug!(%handle, %value, "attribute value has no event decoder");
    } else {
        warn!(%handle, %value, "data with unknown attribute");
    }
}
