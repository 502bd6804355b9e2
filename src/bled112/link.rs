use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use super::framer::Framer;
use super::packet::{Opcode, Packet, PacketKind};
use super::stream::ByteStream;
use crate::error::{HandlerError, LinkError};

/// Callback invoked for every event packet the link dispatches.
pub type PacketListener = Box<dyn FnMut(&Packet) -> Result<(), HandlerError> + Send>;

/// Identifies a registered packet listener.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ListenerId(u64);

/// Command/response correlation over a BGAPI byte stream.
///
/// Waiting for a command response or a specific event keeps dispatching every
/// other event to the registered listeners, so notifications are never lost
/// while a command is in flight. Command waits are unbounded.
///
/// Only BLE events reach listeners. Wi-Fi class packets are framed and
/// returned to callers but never dispatched.
pub struct TransportLink<S> {
    stream: S,
    framer: Framer,
    listeners: Vec<(ListenerId, PacketListener)>,
    next_listener_id: u64,
}

impl<S: std::fmt::Debug> std::fmt::Debug for TransportLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportLink")
            .field("stream", &self.stream)
            .field("framer", &self.framer)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<S: ByteStream> TransportLink<S> {
    /// Creates a link that owns `stream`.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            framer: Framer::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Underlying byte stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Mutable access to the underlying byte stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consumes the link, returning the byte stream.
    pub fn into_stream(self) -> S {
        self.stream
    }

    /// Sends a command and blocks until the dongle responds.
    ///
    /// BLE events received before the response are dispatched to listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not fit in one frame, the stream
    /// fails or closes, or a listener fails.
    #[instrument(
        skip(self, payload),
        level = "trace",
        fields(class_id = opcode.class_id(), command_id = opcode.command_id(), payload_len = payload.len())
    )]
    pub fn send_command(&mut self, opcode: Opcode, payload: &[u8]) -> Result<Packet, LinkError> {
        let frame = Packet::new(PacketKind::BleResponse, opcode, payload.to_vec()).to_frame()?;
        self.stream.write_all(&frame)?;

        loop {
            let Some(packet) = self.read_packet(None)? else {
                return Err(LinkError::StreamClosed);
            };
            if packet.kind() == PacketKind::BleResponse {
                trace!(%packet, "received command response");
                return Ok(packet);
            }
            self.dispatch_ble_event(&packet)?;
        }
    }

    /// Reads the next packet, waiting at most `timeout` (forever when `None`).
    ///
    /// BLE events are dispatched to listeners and also returned. Returns
    /// `Ok(None)` when the timeout elapses or the stream closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or a listener fails.
    pub fn recv_packet(&mut self, timeout: Option<Duration>) -> Result<Option<Packet>, LinkError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let Some(packet) = self.read_packet(deadline)? else {
            return Ok(None);
        };
        self.dispatch_ble_event(&packet)?;
        Ok(Some(packet))
    }

    /// Collects packets until `window` elapses or the stream goes quiet.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or a listener fails.
    pub fn recv_packets(&mut self, window: Duration) -> Result<Vec<Packet>, LinkError> {
        let deadline = Instant::now() + window;
        let mut packets = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(packets);
            }
            match self.recv_packet(Some(remaining))? {
                Some(packet) => packets.push(packet),
                None => return Ok(packets),
            }
        }
    }

    /// Blocks until an event with `opcode` arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or closes, or a listener fails.
    pub fn wait_event(&mut self, opcode: Opcode) -> Result<Packet, LinkError> {
        self.wait_for(|packet| packet.is_event_for(opcode))
    }

    /// Blocks until a BLE event satisfying `predicate` arrives.
    ///
    /// Every BLE event seen along the way, including the matching one, is
    /// dispatched to listeners first.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or closes, or a listener fails.
    #[instrument(skip_all, level = "trace")]
    pub fn wait_for<P>(&mut self, mut predicate: P) -> Result<Packet, LinkError>
    where
        P: FnMut(&Packet) -> bool,
    {
        loop {
            match self.recv_packet(None)? {
                Some(packet) if packet.kind() == PacketKind::BleEvent && predicate(&packet) => {
                    return Ok(packet);
                }
                Some(packet) => trace!(%packet, "skipping packet while waiting for event"),
                None => return Err(LinkError::StreamClosed),
            }
        }
    }

    /// Registers a listener for dispatched events.
    pub fn add_listener(&mut self, listener: PacketListener) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Removes a listener, returning whether it was registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(candidate, _)| *candidate != id);
        before != self.listeners.len()
    }

    /// Removes every listener.
    pub fn clear_listeners(&mut self) {
        if !self.listeners.is_empty() {
            debug!(count = self.listeners.len(), "clearing packet listeners");
        }
        self.listeners.clear();
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Invokes every listener in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first listener failure; later listeners are not invoked.
    pub fn dispatch_event(&mut self, packet: &Packet) -> Result<(), LinkError> {
        for (_, listener) in &mut self.listeners {
            listener(packet).map_err(LinkError::Handler)?;
        }
        Ok(())
    }

    fn dispatch_ble_event(&mut self, packet: &Packet) -> Result<(), LinkError> {
        match packet.kind() {
            PacketKind::BleEvent => self.dispatch_event(packet),
            PacketKind::WifiEvent => {
                trace!(%packet, "ignoring wifi event");
                Ok(())
            }
            PacketKind::BleResponse | PacketKind::WifiResponse => Ok(()),
        }
    }

    fn read_packet(&mut self, deadline: Option<Instant>) -> Result<Option<Packet>, LinkError> {
        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    Some(remaining)
                }
                None => None,
            };

            let Some(byte) = self.stream.read_byte(remaining)? else {
                return Ok(None);
            };
            if let Some(packet) = self.framer.feed(byte) {
                trace!(%packet, "received packet");
                return Ok(Some(packet));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::bled112::stream::MemoryStream;

    fn event(opcode: Opcode, payload: &[u8]) -> Packet {
        Packet::new(PacketKind::BleEvent, opcode, payload.to_vec())
    }

    fn response(opcode: Opcode, payload: &[u8]) -> Packet {
        Packet::new(PacketKind::BleResponse, opcode, payload.to_vec())
    }

    fn link_with(packets: &[Packet]) -> TransportLink<MemoryStream> {
        let bytes: Vec<u8> = packets
            .iter()
            .flat_map(|packet| packet.to_frame().expect("test packets fit in one frame"))
            .collect();
        TransportLink::new(MemoryStream::new(bytes))
    }

    fn recording_listener(seen: &Arc<Mutex<Vec<Packet>>>) -> PacketListener {
        let seen = Arc::clone(seen);
        Box::new(move |packet: &Packet| {
            seen.lock().push(packet.clone());
            Ok(())
        })
    }

    #[test]
    fn send_command_writes_header_and_payload() -> Result<(), LinkError> {
        let mut link = link_with(&[response(Opcode::GAP_DISCOVER, &[0x00, 0x00])]);

        link.send_command(Opcode::GAP_DISCOVER, &[0x01])?;

        assert_eq!(&[0x00, 0x01, 0x06, 0x02, 0x01], link.stream().written());
        Ok(())
    }

    #[test]
    fn send_command_dispatches_interleaved_events_once() -> Result<(), LinkError> {
        let notification = event(
            Opcode::ATTCLIENT_ATTRIBUTE_VALUE,
            &[0x00, 0x11, 0x00, 0x01, 0x01, 0x55],
        );
        let mut link = link_with(&[
            notification.clone(),
            response(Opcode::GAP_END_PROCEDURE, &[0x00, 0x00]),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        link.add_listener(recording_listener(&seen));

        let reply = link.send_command(Opcode::GAP_END_PROCEDURE, &[])?;

        assert_eq!(PacketKind::BleResponse, reply.kind());
        assert_eq!(vec![notification], *seen.lock());
        Ok(())
    }

    #[test]
    fn send_command_rejects_oversized_payload_before_writing() {
        let mut link = link_with(&[]);

        let result = link.send_command(Opcode::ATTCLIENT_ATTRIBUTE_WRITE, &[0u8; 256]);

        assert_matches!(result, Err(LinkError::PayloadTooLarge { len: 256, max: 255 }));
        assert_eq!(0, link.stream().written().len());
    }

    #[test]
    fn send_command_reports_closed_stream() {
        let mut link = link_with(&[]);
        let result = link.send_command(Opcode::GAP_END_PROCEDURE, &[]);
        assert_matches!(result, Err(LinkError::StreamClosed));
    }

    #[test]
    fn recv_packet_returns_none_when_stream_is_exhausted() -> Result<(), LinkError> {
        let mut link = link_with(&[]);
        assert_eq!(None, link.recv_packet(Some(Duration::from_millis(5)))?);
        Ok(())
    }

    #[test]
    fn recv_packet_dispatches_and_returns_events() -> Result<(), LinkError> {
        let status = event(Opcode::CONNECTION_STATUS, &[0x00, 0x05]);
        let mut link = link_with(&[status.clone()]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        link.add_listener(recording_listener(&seen));

        let received = link.recv_packet(None)?;

        assert_eq!(Some(status.clone()), received);
        assert_eq!(vec![status], *seen.lock());
        Ok(())
    }

    #[test]
    fn recv_packet_does_not_dispatch_responses() -> Result<(), LinkError> {
        let mut link = link_with(&[response(Opcode::GAP_DISCOVER, &[0x00, 0x00])]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        link.add_listener(recording_listener(&seen));

        assert!(link.recv_packet(None)?.is_some());
        assert!(seen.lock().is_empty());
        Ok(())
    }

    #[test]
    fn wifi_events_are_returned_but_not_dispatched() -> Result<(), LinkError> {
        let wifi = Packet::new(PacketKind::WifiEvent, Opcode::new(0x01, 0x02), vec![0x07]);
        let ble = event(Opcode::CONNECTION_STATUS, &[0x00, 0x05]);
        let mut link = link_with(&[
            wifi.clone(),
            ble.clone(),
            wifi.clone(),
            response(Opcode::GAP_END_PROCEDURE, &[0x00, 0x00]),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        link.add_listener(recording_listener(&seen));

        assert_eq!(Some(wifi), link.recv_packet(None)?);
        assert!(seen.lock().is_empty());
        link.send_command(Opcode::GAP_END_PROCEDURE, &[])?;

        assert_eq!(vec![ble], *seen.lock());
        Ok(())
    }

    #[test]
    fn wait_event_skips_unrelated_traffic() -> Result<(), LinkError> {
        let target = event(
            Opcode::ATTCLIENT_PROCEDURE_COMPLETED,
            &[0x00, 0x00, 0x00, 0x19, 0x00],
        );
        let mut link = link_with(&[
            response(Opcode::ATTCLIENT_ATTRIBUTE_WRITE, &[0x00, 0x00, 0x00]),
            event(Opcode::GAP_SCAN_RESPONSE, &[0xC0]),
            target.clone(),
        ]);

        assert_eq!(target, link.wait_event(Opcode::ATTCLIENT_PROCEDURE_COMPLETED)?);
        Ok(())
    }

    #[test]
    fn failing_listener_aborts_remaining_dispatch() {
        let mut link = link_with(&[event(Opcode::CONNECTION_STATUS, &[0x00])]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        link.add_listener(Box::new(|_packet: &Packet| -> Result<(), HandlerError> {
            Err("listener exploded".into())
        }));
        link.add_listener(recording_listener(&seen));

        let result = link.recv_packet(None);

        assert_matches!(result, Err(LinkError::Handler(_)));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn removed_listener_is_not_invoked() -> Result<(), LinkError> {
        let mut link = link_with(&[event(Opcode::CONNECTION_STATUS, &[0x00])]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = link.add_listener(recording_listener(&seen));

        assert!(link.remove_listener(id));
        assert!(!link.remove_listener(id));
        link.recv_packet(None)?;

        assert!(seen.lock().is_empty());
        assert_eq!(0, link.listener_count());
        Ok(())
    }

    #[test]
    fn recv_packets_collects_until_quiet() -> Result<(), LinkError> {
        let mut link = link_with(&[
            event(Opcode::GAP_SCAN_RESPONSE, &[0x01]),
            event(Opcode::GAP_SCAN_RESPONSE, &[0x02]),
        ]);

        let packets = link.recv_packets(Duration::from_millis(50))?;

        assert_eq!(2, packets.len());
        Ok(())
    }
}
