use serde::Serialize;
use strum_macros::{Display, EnumIter, FromRepr};

use crate::error::DecodeError;

/// Kinds of data an armband can stream.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataCategory {
    Arm,
    Battery,
    Emg,
    Imu,
    Pose,
}

/// Arm the armband is worn on.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, FromRepr, Serialize)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Arm {
    Unknown = 0,
    Right = 1,
    Left = 2,
}

impl TryFrom<u8> for Arm {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(DecodeError::UnknownArm { value })
    }
}

/// Orientation of the armband's x axis.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, FromRepr, Serialize)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum XDirection {
    Unknown = 0,
    TowardWrist = 1,
    TowardElbow = 2,
}

impl TryFrom<u8> for XDirection {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(DecodeError::UnknownXDirection { value })
    }
}

/// Hand pose recognised by the on-board classifier.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, FromRepr, Serialize)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Pose {
    Rest = 0,
    Fist = 1,
    WaveIn = 2,
    WaveOut = 3,
    FingersSpread = 4,
    ThumbToPinky = 5,
    Unknown = 255,
}

impl TryFrom<u8> for Pose {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(DecodeError::UnknownPose { value })
    }
}

/// One EMG reading across the eight sensor pods.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum EmgSample {
    /// Rectified and smoothed amplitudes with the on-board motion flag.
    Smoothed { values: [u16; 8], moving: u8 },
    /// Unprocessed samples from one of the four raw EMG characteristics.
    Raw { characteristic: u8, values: [i8; 8] },
}

/// Orientation quaternion plus accelerometer and gyroscope readings, in
/// device units.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct ImuSample {
    pub orientation: [i16; 4],
    pub accelerometer: [i16; 3],
    pub gyroscope: [i16; 3],
}

/// A decoded notification.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "category", content = "data", rename_all = "snake_case")]
pub enum MyoEvent {
    Emg(EmgSample),
    Imu(ImuSample),
    Arm { arm: Arm, x_direction: XDirection },
    Pose(Pose),
    Battery(u8),
}

impl MyoEvent {
    /// Category whose handlers receive this event.
    #[must_use]
    pub fn category(&self) -> DataCategory {
        match self {
            Self::Emg(_) => DataCategory::Emg,
            Self::Imu(_) => DataCategory::Imu,
            Self::Arm { .. } => DataCategory::Arm,
            Self::Pose(_) => DataCategory::Pose,
            Self::Battery(_) => DataCategory::Battery,
        }
    }
}
