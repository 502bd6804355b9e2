use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use strum_macros::{Display, FromRepr};

use crate::bled112::MAX_PAYLOAD_LEN;
use crate::error::CommandError;

const COMMAND_VIBRATE: u8 = 0x03;
const COMMAND_DEEP_SLEEP: u8 = 0x04;
const COMMAND_SET_LEDS: u8 = 0x06;
const COMMAND_SET_SLEEP_MODE: u8 = 0x09;

/// Longest device name that fits in one attribute write.
pub const MAX_NAME_LEN: usize = MAX_PAYLOAD_LEN - 4;

/// Whether the armband may sleep when idle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Display, FromRepr, ValueEnum)]
#[repr(u8)]
#[strum(serialize_all = "kebab-case")]
pub enum SleepMode {
    /// Sleep after a period of inactivity.
    #[default]
    Normal = 0,
    /// Stay awake while connected.
    NeverSleep = 1,
}

impl TryFrom<u8> for SleepMode {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(CommandError::InvalidSleepMode { value })
    }
}

/// Length of a vibration pulse.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, FromRepr, ValueEnum)]
#[repr(u8)]
#[strum(serialize_all = "kebab-case")]
pub enum Vibration {
    Short = 1,
    Medium = 2,
    Long = 3,
}

impl TryFrom<u8> for Vibration {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(CommandError::InvalidVibration { value })
    }
}

/// An LED colour.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Creates an RGB colour.
    ///
    /// ```
    /// use myo_raw::Rgb;
    ///
    /// let colour = Rgb::new(0, 255, 0);
    /// assert_eq!(255, colour.g);
    /// ```
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", hex::encode_upper(self.channels()))
    }
}

impl FromStr for Rgb {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits = value.trim().trim_start_matches('#');
        let mut channels = [0u8; 3];
        hex::decode_to_slice(digits, &mut channels).map_err(|_| CommandError::InvalidColour {
            value: value.to_string(),
        })?;
        let [r, g, b] = channels;
        Ok(Self::new(r, g, b))
    }
}

pub(crate) fn sleep_mode_payload(mode: SleepMode) -> [u8; 3] {
    [COMMAND_SET_SLEEP_MODE, 0x01, mode as u8]
}

pub(crate) fn vibrate_payload(vibration: Vibration) -> [u8; 3] {
    [COMMAND_VIBRATE, 0x01, vibration as u8]
}

pub(crate) fn leds_payload(logo: Rgb, line: Rgb) -> [u8; 8] {
    let [logo_r, logo_g, logo_b] = logo.channels();
    let [line_r, line_g, line_b] = line.channels();
    [
        COMMAND_SET_LEDS,
        0x06,
        logo_r,
        logo_g,
        logo_b,
        line_r,
        line_g,
        line_b,
    ]
}

pub(crate) fn deep_sleep_payload() -> [u8; 2] {
    [COMMAND_DEEP_SLEEP, 0x00]
}

/// Validates and encodes a device name.
pub(crate) fn name_payload(name: &str) -> Result<&[u8], CommandError> {
    let bytes = name.as_bytes();
    if bytes.len() > MAX_NAME_LEN {
        return Err(CommandError::NameTooLong {
            len: bytes.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(bytes)
}
