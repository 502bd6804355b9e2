use std::collections::HashMap;
use std::sync::LazyLock;

use clap::ValueEnum;
use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, FromRepr};

use crate::error::CommandError;

/// 128-bit service identifier advertised by Myo armbands, in advertisement byte order.
pub const MYO_SERVICE_ID: [u8; 16] = [
    0x42, 0x48, 0x12, 0x4a, 0x7f, 0x2c, 0x48, 0x47, 0xb9, 0xde, 0x04, 0xa9, 0x01, 0x00, 0x06, 0xd5,
];

/// Value written to a client characteristic configuration descriptor to enable notifications.
pub(crate) const ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];
/// Value written to a client characteristic configuration descriptor to enable indications.
pub(crate) const ENABLE_INDICATIONS: [u8; 2] = [0x02, 0x00];
/// Battery notification enable value sent by the vendor tooling.
pub(crate) const ENABLE_BATTERY_NOTIFICATIONS: [u8; 2] = [0x01, 0x10];

/// Raw GATT attribute handle.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    derive_more::From,
    derive_more::Into,
)]
pub struct AttributeHandle(u16);

impl AttributeHandle {
    /// Creates a handle from its raw value.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Raw handle value.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Little-endian wire encoding.
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Known attribute at this handle, if any.
    #[must_use]
    pub fn attribute(self) -> Option<Attribute> {
        ATTRIBUTES_BY_HANDLE.get(&self).copied()
    }
}

impl std::fmt::Display for AttributeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.attribute() {
            Some(attribute) => write!(f, "{:#06x} ({attribute})", self.0),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

/// Known Myo GATT attributes.
///
/// The handle numbers are fixed by the armband firmware.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum Attribute {
    /// Device name characteristic.
    #[strum(to_string = "device_name")]
    DeviceName,
    /// Battery level characteristic.
    #[strum(to_string = "battery_level")]
    BatteryLevel,
    /// Battery level notification descriptor.
    #[strum(to_string = "battery_level_cccd")]
    BatteryLevelCccd,
    /// Firmware version characteristic.
    #[strum(to_string = "firmware_version")]
    FirmwareVersion,
    /// Command characteristic.
    #[strum(to_string = "command")]
    Command,
    /// IMU data characteristic.
    #[strum(to_string = "imu_data")]
    ImuData,
    /// IMU data notification descriptor.
    #[strum(to_string = "imu_data_cccd")]
    ImuDataCccd,
    /// Classifier event characteristic.
    #[strum(to_string = "classifier_event")]
    ClassifierEvent,
    /// Classifier event indication descriptor.
    #[strum(to_string = "classifier_event_cccd")]
    ClassifierEventCccd,
    /// Undocumented smoothed EMG characteristic.
    #[strum(to_string = "smoothed_emg")]
    SmoothedEmg,
    /// Smoothed EMG notification descriptor.
    #[strum(to_string = "smoothed_emg_cccd")]
    SmoothedEmgCccd,
    /// Raw EMG characteristic 0.
    #[strum(to_string = "emg_data_0")]
    EmgData0,
    /// Raw EMG characteristic 0 notification descriptor.
    #[strum(to_string = "emg_data_0_cccd")]
    EmgData0Cccd,
    /// Raw EMG characteristic 1.
    #[strum(to_string = "emg_data_1")]
    EmgData1,
    /// Raw EMG characteristic 1 notification descriptor.
    #[strum(to_string = "emg_data_1_cccd")]
    EmgData1Cccd,
    /// Raw EMG characteristic 2.
    #[strum(to_string = "emg_data_2")]
    EmgData2,
    /// Raw EMG characteristic 2 notification descriptor.
    #[strum(to_string = "emg_data_2_cccd")]
    EmgData2Cccd,
    /// Raw EMG characteristic 3.
    #[strum(to_string = "emg_data_3")]
    EmgData3,
    /// Raw EMG characteristic 3 notification descriptor.
    #[strum(to_string = "emg_data_3_cccd")]
    EmgData3Cccd,
}

impl Attribute {
    /// Raw EMG value characteristics in characteristic order.
    pub const RAW_EMG: [Self; 4] = [Self::EmgData0, Self::EmgData1, Self::EmgData2, Self::EmgData3];

    /// Handle number on the device.
    #[must_use]
    pub const fn handle(self) -> AttributeHandle {
        AttributeHandle::new(match self {
            Self::DeviceName => 0x03,
            Self::BatteryLevel => 0x11,
            Self::BatteryLevelCccd => 0x12,
            Self::FirmwareVersion => 0x17,
            Self::Command => 0x19,
            Self::ImuData => 0x1c,
            Self::ImuDataCccd => 0x1d,
            Self::ClassifierEvent => 0x23,
            Self::ClassifierEventCccd => 0x24,
            Self::SmoothedEmg => 0x27,
            Self::SmoothedEmgCccd => 0x28,
            Self::EmgData0 => 0x2b,
            Self::EmgData0Cccd => 0x2c,
            Self::EmgData1 => 0x2e,
            Self::EmgData1Cccd => 0x2f,
            Self::EmgData2 => 0x31,
            Self::EmgData2Cccd => 0x32,
            Self::EmgData3 => 0x34,
            Self::EmgData3Cccd => 0x35,
        })
    }
}

static ATTRIBUTES_BY_HANDLE: LazyLock<HashMap<AttributeHandle, Attribute>> =
    LazyLock::new(|| {
        Attribute::iter()
            .map(|attribute| (attribute.handle(), attribute))
            .collect()
    });

/// A value destined for one attribute handle.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct AttributeWrite {
    handle: AttributeHandle,
    value: Vec<u8>,
}

impl AttributeWrite {
    /// Creates a write of `value` to `handle`.
    #[must_use]
    pub fn new(handle: AttributeHandle, value: impl Into<Vec<u8>>) -> Self {
        Self {
            handle,
            value: value.into(),
        }
    }

    /// Target handle.
    #[must_use]
    pub fn handle(&self) -> AttributeHandle {
        self.handle
    }

    /// Bytes to write.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// EMG streaming mode written to the command characteristic.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Display, FromRepr, ValueEnum, Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum EmgMode {
    /// No EMG data.
    #[strum(to_string = "off")]
    Off = 0x00,
    /// Undocumented 50 Hz rectified and smoothed stream.
    #[strum(to_string = "smoothed")]
    Smoothed = 0x01,
    /// 200 Hz stream with power-line notch filters applied.
    #[strum(to_string = "raw_filtered")]
    RawFiltered = 0x02,
    /// 200 Hz unfiltered stream.
    #[default]
    #[strum(to_string = "raw")]
    Raw = 0x03,
}

impl EmgMode {
    /// Raw protocol byte.
    #[must_use]
    pub fn as_raw(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for EmgMode {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(CommandError::InvalidEmgMode { value })
    }
}

/// IMU streaming mode written to the command characteristic.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Display, FromRepr, ValueEnum, Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum ImuMode {
    /// No IMU data.
    #[strum(to_string = "off")]
    Off = 0x00,
    /// Orientation, accelerometer and gyroscope samples.
    #[default]
    #[strum(to_string = "data")]
    Data = 0x01,
    /// Motion events only.
    #[strum(to_string = "events")]
    Events = 0x02,
    /// Samples and motion events.
    #[strum(to_string = "all")]
    All = 0x03,
    /// Unprocessed sensor samples.
    #[strum(to_string = "raw")]
    Raw = 0x04,
}

impl ImuMode {
    /// Raw protocol byte.
    #[must_use]
    pub fn as_raw(self) -> u8 {
        self as u8
    }
}
