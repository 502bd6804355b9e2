use std::fmt;
use std::str::FromStr;

use bon::Builder;
use serde::Serialize;
use strum_macros::Display;

use crate::error::FixtureError;
use crate::protocol::{
    Attribute, AttributeWrite, ENABLE_BATTERY_NOTIFICATIONS, ENABLE_INDICATIONS,
    ENABLE_NOTIFICATIONS, EmgMode, ImuMode,
};

const FIRMWARE_LEN: usize = 8;

const SET_MODE_COMMAND: u8 = 0x01;
const SET_MODE_PAYLOAD_LEN: u8 = 0x03;
const LEGACY_PREAMBLE: [u8; 4] = [0x01, 0x02, 0x00, 0x00];
const LEGACY_SENSOR_RATE_HZ: u16 = 1000;
const LEGACY_EMG_SMOOTHING: u8 = 100;
const LEGACY_EMG_RATE_HZ: u16 = 50;
const LEGACY_IMU_RATE_HZ: u8 = 50;

/// Firmware version reported by the armband.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub hardware_revision: u16,
}

impl FirmwareVersion {
    /// Creates a version from its parts.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16, hardware_revision: u16) -> Self {
        Self {
            major,
            minor,
            patch,
            hardware_revision,
        }
    }

    /// Parses the four little-endian `u16` fields of the firmware attribute.
    ///
    /// Returns `None` unless `bytes` is exactly eight bytes long.
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; FIRMWARE_LEN] = bytes.try_into().ok()?;
        let word = |index: usize| u16::from_le_bytes([bytes[index * 2], bytes[index * 2 + 1]]);
        Some(Self::new(word(0), word(1), word(2), word(3)))
    }

    /// Protocol dialect this firmware speaks.
    #[must_use]
    pub fn variant(self) -> ProtocolVariant {
        if self.major == 0 {
            ProtocolVariant::Legacy
        } else {
            ProtocolVariant::Modern
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.hardware_revision
        )
    }
}

impl FromStr for FirmwareVersion {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || FixtureError::InvalidFirmwareVersion {
            value: value.to_string(),
        };
        let parts = value
            .trim()
            .split('.')
            .map(str::parse::<u16>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;
        let [major, minor, patch, hardware_revision] = parts[..] else {
            return Err(invalid());
        };
        Ok(Self::new(major, minor, patch, hardware_revision))
    }
}

/// What to stream after connecting.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Builder)]
pub struct SubscribeOptions {
    #[builder(default)]
    emg_mode: EmgMode,
    #[builder(default)]
    imu_mode: ImuMode,
    #[builder(default = true)]
    classifier: bool,
    #[builder(default = true)]
    battery: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SubscribeOptions {
    #[must_use]
    pub fn emg_mode(&self) -> EmgMode {
        self.emg_mode
    }

    #[must_use]
    pub fn imu_mode(&self) -> ImuMode {
        self.imu_mode
    }

    #[must_use]
    pub fn classifier(&self) -> bool {
        self.classifier
    }

    #[must_use]
    pub fn battery(&self) -> bool {
        self.battery
    }
}

/// Subscription dialect, chosen from the firmware major version.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProtocolVariant {
    /// Pre-1.0 firmware; streams everything with fixed sensor parameters.
    Legacy,
    /// 1.0 and later firmware; streams what the options select.
    Modern,
}

impl ProtocolVariant {
    /// Attribute writes that enable streaming, in the order they must be sent.
    ///
    /// Legacy firmware ignores `options`.
    #[must_use]
    pub fn subscription_plan(self, options: &SubscribeOptions) -> Vec<AttributeWrite> {
        match self {
            Self::Legacy => legacy_plan(),
            Self::Modern => modern_plan(options),
        }
    }
}

fn legacy_plan() -> Vec<AttributeWrite> {
    let command = Attribute::Command.handle();
    let mut plan = vec![AttributeWrite::new(command, LEGACY_PREAMBLE)];
    plan.extend(
        [
            Attribute::EmgData1Cccd,
            Attribute::EmgData0Cccd,
            Attribute::EmgData2Cccd,
            Attribute::EmgData3Cccd,
            Attribute::SmoothedEmgCccd,
            Attribute::ImuDataCccd,
        ]
        .into_iter()
        .map(|attribute| AttributeWrite::new(attribute.handle(), ENABLE_NOTIFICATIONS)),
    );

    let mut parameters = vec![0x02, 0x09, 0x02, 0x01];
    parameters.extend_from_slice(&LEGACY_SENSOR_RATE_HZ.to_le_bytes());
    parameters.extend_from_slice(&[
        LEGACY_EMG_SMOOTHING,
        (LEGACY_SENSOR_RATE_HZ / LEGACY_EMG_RATE_HZ) as u8,
        LEGACY_IMU_RATE_HZ,
        0x00,
        0x00,
    ]);
    plan.push(AttributeWrite::new(command, parameters));
    plan
}

fn modern_plan(options: &SubscribeOptions) -> Vec<AttributeWrite> {
    let mut plan = Vec::new();
    if options.imu_mode != ImuMode::Off {
        plan.push(AttributeWrite::new(
            Attribute::ImuDataCccd.handle(),
            ENABLE_NOTIFICATIONS,
        ));
    }
    if options.classifier {
        plan.push(AttributeWrite::new(
            Attribute::ClassifierEventCccd.handle(),
            ENABLE_INDICATIONS,
        ));
    }
    if options.battery {
        plan.push(AttributeWrite::new(
            Attribute::BatteryLevelCccd.handle(),
            ENABLE_BATTERY_NOTIFICATIONS,
        ));
    }

    let emg_descriptors: &[Attribute] = match options.emg_mode {
        EmgMode::Raw | EmgMode::RawFiltered => &[
            Attribute::EmgData0Cccd,
            Attribute::EmgData1Cccd,
            Attribute::EmgData2Cccd,
            Attribute::EmgData3Cccd,
        ],
        EmgMode::Smoothed => &[Attribute::SmoothedEmgCccd],
        EmgMode::Off => &[],
    };
    plan.extend(
        emg_descriptors
            .iter()
            .map(|attribute| AttributeWrite::new(attribute.handle(), ENABLE_NOTIFICATIONS)),
    );

    plan.push(AttributeWrite::new(
        Attribute::Command.handle(),
        [
            SET_MODE_COMMAND,
            SET_MODE_PAYLOAD_LEN,
            options.emg_mode.as_raw(),
            options.imu_mode.as_raw(),
            u8::from(options.classifier),
        ],
    ));
    plan
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::protocol::AttributeHandle;

    fn handles(plan: &[AttributeWrite]) -> Vec<u16> {
        plan.iter().map(|write| write.handle().value()).collect()
    }

    #[rstest]
    #[case(FirmwareVersion::new(0, 9, 9, 9), ProtocolVariant::Legacy)]
    #[case(FirmwareVersion::new(1, 0, 0, 0), ProtocolVariant::Modern)]
    #[case(FirmwareVersion::new(1, 5, 1970, 2), ProtocolVariant::Modern)]
    fn major_version_selects_variant(
        #[case] version: FirmwareVersion,
        #[case] expected: ProtocolVariant,
    ) {
        assert_eq!(expected, version.variant());
    }

    #[test]
    fn firmware_parses_little_endian_words() {
        let bytes = [0x01, 0x00, 0x05, 0x00, 0xB2, 0x07, 0x02, 0x00];
        assert_eq!(
            Some(FirmwareVersion::new(1, 5, 1970, 2)),
            FirmwareVersion::from_le_bytes(&bytes)
        );
        assert_eq!(None, FirmwareVersion::from_le_bytes(&bytes[..7]));
    }

    #[test]
    fn firmware_parses_dotted_text() {
        assert_eq!(
            Some(FirmwareVersion::new(0, 9, 0, 1)),
            "0.9.0.1".parse().ok()
        );
        assert!("1.5".parse::<FirmwareVersion>().is_err());
        assert!("1.x.0.0".parse::<FirmwareVersion>().is_err());
    }

    #[test]
    fn legacy_plan_writes_fixed_sequence() {
        let plan = ProtocolVariant::Legacy.subscription_plan(&SubscribeOptions::default());

        assert_eq!(
            vec![0x19, 0x2f, 0x2c, 0x32, 0x35, 0x28, 0x1d, 0x19],
            handles(&plan)
        );
        assert_eq!(&[0x01, 0x02, 0x00, 0x00], plan[0].value());
        assert_eq!(
            &[0x02, 0x09, 0x02, 0x01, 0xE8, 0x03, 0x64, 0x14, 0x32, 0x00, 0x00],
            plan[7].value()
        );
    }

    #[test]
    fn modern_raw_plan_subscribes_official_emg_characteristics() {
        let plan = ProtocolVariant::Modern.subscription_plan(&SubscribeOptions::default());

        assert_eq!(
            vec![0x1d, 0x24, 0x12, 0x2c, 0x2f, 0x32, 0x35, 0x19],
            handles(&plan)
        );
        assert_eq!(&[0x02, 0x00], plan[1].value());
        assert_eq!(&[0x01, 0x10], plan[2].value());
        assert_eq!(&[0x01, 0x03, 0x03, 0x01, 0x01], plan[7].value());
    }

    #[test]
    fn modern_smoothed_plan_subscribes_hidden_characteristic_only() {
        let options = SubscribeOptions::builder()
            .emg_mode(EmgMode::Smoothed)
            .imu_mode(ImuMode::Off)
            .classifier(false)
            .battery(false)
            .build();

        let plan = ProtocolVariant::Modern.subscription_plan(&options);

        assert_eq!(vec![0x28, 0x19], handles(&plan));
        assert_eq!(&[0x01, 0x03, 0x01, 0x00, 0x00], plan[1].value());
    }

    #[rstest]
    #[case(EmgMode::Off, 0)]
    #[case(EmgMode::Smoothed, 1)]
    #[case(EmgMode::RawFiltered, 4)]
    #[case(EmgMode::Raw, 4)]
    fn emg_mode_controls_descriptor_count(#[case] emg_mode: EmgMode, #[case] expected: usize) {
        let options = SubscribeOptions::builder().emg_mode(emg_mode).build();
        let emg_descriptors: Vec<AttributeHandle> = [
            Attribute::EmgData0Cccd,
            Attribute::EmgData1Cccd,
            Attribute::EmgData2Cccd,
            Attribute::EmgData3Cccd,
            Attribute::SmoothedEmgCccd,
        ]
        .map(Attribute::handle)
        .to_vec();

        let plan = ProtocolVariant::Modern.subscription_plan(&options);
        let count = plan
            .iter()
            .filter(|write| emg_descriptors.contains(&write.handle()))
            .count();

        assert_eq!(expected, count);
    }
}
