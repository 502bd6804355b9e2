use tracing::trace;

use super::packet::{HEADER_LEN, Packet, PacketKind};

/// Reassembles a BGAPI byte stream into packets.
///
/// The framer is fed one byte at a time and keeps partial frames across calls,
/// so reads may be split at arbitrary boundaries. Bytes that cannot start a
/// frame are dropped one at a time until a recognised header type appears.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
    expected_len: usize,
}

impl Framer {
    /// Creates an idle framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one byte, returning a packet once a frame is complete.
    pub fn feed(&mut self, byte: u8) -> Option<Packet> {
        match self.buffer.len() {
            0 => {
                if PacketKind::from_header(byte).is_some() {
                    self.buffer.push(byte);
                } else {
                    trace!(byte, "discarding byte outside of a frame");
                }
                return None;
            }
            1 => {
                self.buffer.push(byte);
                self.expected_len =
                    HEADER_LEN + usize::from(self.buffer[0] & 0x07) + usize::from(byte);
                return None;
            }
            _ => self.buffer.push(byte),
        }

        if self.buffer.len() < self.expected_len {
            return None;
        }

        let packet = Packet::from_frame(&self.buffer);
        self.reset();
        packet
    }

    /// Feeds a slice, collecting every packet completed along the way.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<Packet> {
        bytes.iter().filter_map(|byte| self.feed(*byte)).collect()
    }

    /// Drops any partially received frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_len = 0;
    }

    /// Returns whether no partial frame is buffered.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty()
    }
}
