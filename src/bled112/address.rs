use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::CommandError;

/// Length of a Bluetooth device address in bytes.
pub const ADDRESS_LEN: usize = 6;

/// Bluetooth device address in display order (most significant octet first).
///
/// BGAPI carries addresses least significant octet first; use
/// [`DeviceAddress::from_wire`] and [`DeviceAddress::to_wire`] at the boundary.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct DeviceAddress([u8; ADDRESS_LEN]);

impl DeviceAddress {
    /// Creates an address from octets in display order.
    #[must_use]
    pub const fn new(octets: [u8; ADDRESS_LEN]) -> Self {
        Self(octets)
    }

    /// Parses the little-endian octets found in BGAPI payloads.
    ///
    /// Returns `None` unless `wire` is exactly six bytes long.
    #[must_use]
    pub fn from_wire(wire: &[u8]) -> Option<Self> {
        let mut octets: [u8; ADDRESS_LEN] = wire.try_into().ok()?;
        octets.reverse();
        Some(Self(octets))
    }

    /// Octets in BGAPI wire order.
    #[must_use]
    pub fn to_wire(self) -> [u8; ADDRESS_LEN] {
        let mut wire = self.0;
        wire.reverse();
        wire
    }

    /// Octets in display order.
    #[must_use]
    pub fn octets(self) -> [u8; ADDRESS_LEN] {
        self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, octet) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(":")?;
            }
            f.write_str(&hex::encode([*octet]))?;
        }
        Ok(())
    }
}

impl FromStr for DeviceAddress {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || CommandError::InvalidAddress {
            value: value.to_string(),
        };

        let mut octets = [0u8; ADDRESS_LEN];
        let mut parts = value.trim().split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            let mut decoded = [0u8; 1];
            hex::decode_to_slice(part, &mut decoded).map_err(|_| invalid())?;
            *octet = decoded[0];
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
