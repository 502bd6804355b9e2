use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::bled112::{
    DeviceAddress, DongleConfig, FakeAdvertisement, FakeDongleConfig, FakeNotifications,
};
use crate::cli::control::ControlArgs;
use crate::cli::stream::StreamArgs;
use crate::error::FixtureError;
use crate::myo::FirmwareVersion;

/// Command-line options for the Myo armband tool.
#[derive(Debug, Parser)]
#[command(
    name = "myo-raw",
    about = "Stream data from and control a Myo armband through a BLED112 dongle."
)]
pub struct Args {
    /// Serial device of the BLED112 dongle. Detected from its USB identifiers when omitted.
    #[arg(long, global = true, conflicts_with = "fake")]
    tty: Option<String>,
    /// Connect only to the armband with this address (e.g. `c0:ff:ee:00:00:01`).
    #[arg(long, global = true)]
    mac: Option<DeviceAddress>,
    /// Uses a simulated dongle and armband instead of a serial port.
    #[arg(long, global = true)]
    fake: bool,
    /// Firmware version reported by the simulated armband (e.g. `1.5.1970.2`).
    #[arg(long, global = true, requires = "fake")]
    fake_firmware: Option<FirmwareVersion>,
    /// Device name reported by the simulated armband.
    #[arg(long, global = true, requires = "fake")]
    fake_name: Option<String>,
    /// Battery level reported by the simulated armband.
    #[arg(long, global = true, requires = "fake")]
    fake_battery: Option<u8>,
    /// Notifications the simulated armband sends once streaming starts,
    /// as `handle:hexvalue` records separated by commas.
    #[arg(long, global = true, requires = "fake")]
    fake_notifications: Option<FakeNotifications>,
    /// Overrides `RUST_LOG` with a single maximum log level.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use myo_raw::{Args, Command};
    ///
    /// let info = Args::new(Command::Info);
    /// let _ = info;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            tty: None,
            mac: None,
            fake: false,
            fake_firmware: None,
            fake_name: None,
            fake_battery: None,
            fake_notifications: None,
            log_level: None,
            output: None,
            command,
        }
    }

    /// Switches to the simulated dongle with pre-parsed fake settings.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            firmware,
            name,
            battery_level,
            notifications,
        } = fake;

        self.tty = None;
        self.fake = true;
        self.fake_firmware = firmware;
        self.fake_name = name;
        self.fake_battery = battery_level;
        self.fake_notifications = notifications;
        self
    }

    /// Restricts the scan to one armband address.
    #[must_use]
    pub fn with_mac(mut self, mac: DeviceAddress) -> Self {
        self.mac = Some(mac);
        self
    }

    /// Returns the optional log-level override.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the explicitly requested output format, if any.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Returns the address filter, if any.
    #[must_use]
    pub fn mac(&self) -> Option<DeviceAddress> {
        self.mac
    }

    /// Splits parsed arguments into the command and the dongle to open.
    #[must_use]
    pub fn into_command_and_source(self) -> (Command, DeviceSource) {
        let Args {
            tty,
            mac,
            fake,
            fake_firmware,
            fake_name,
            fake_battery,
            fake_notifications,
            command,
            ..
        } = self;

        let source = if fake {
            let fake_args = FakeArgs {
                firmware: fake_firmware,
                name: fake_name,
                battery_level: fake_battery,
                notifications: fake_notifications,
            };
            DeviceSource::Fake(fake_args.into_dongle_config(mac))
        } else {
            DeviceSource::Dongle(DongleConfig::builder().maybe_tty(tty).build())
        };

        (command, source)
    }
}

/// Simulated armband settings for programmatic runs.
#[derive(Debug, Default, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    firmware: Option<FirmwareVersion>,
    #[builder(into)]
    name: Option<String>,
    battery_level: Option<u8>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    notifications: Option<FakeNotifications>,
}

impl FakeArgs {
    /// The simulated armband advertises `mac` when one is given.
    pub(crate) fn into_dongle_config(self, mac: Option<DeviceAddress>) -> FakeDongleConfig {
        let Self {
            firmware,
            name,
            battery_level,
            notifications,
        } = self;

        let advertisements = mac.map(|address| vec![FakeAdvertisement::myo(address)]);
        let firmware = firmware.map(|version| {
            [
                version.major,
                version.minor,
                version.patch,
                version.hardware_revision,
            ]
        });

        FakeDongleConfig::builder()
            .maybe_advertisements(advertisements)
            .maybe_firmware(firmware)
            .maybe_name(name)
            .maybe_battery_level(battery_level)
            .maybe_notifications(notifications.map(Into::into))
            .build()
    }
}

/// Where the session's byte stream comes from.
#[derive(Debug, Clone)]
pub enum DeviceSource {
    /// A BLED112 dongle on a serial port.
    Dongle(DongleConfig),
    /// The in-process simulated dongle.
    Fake(FakeDongleConfig),
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the first armband and print its data events until Ctrl+C.
    Stream(StreamArgs),
    /// Connect to the first armband and print its address, firmware, name and battery level.
    Info,
    /// Connect to the first armband and send one device command.
    Control(ControlArgs),
}

/// Maximum log level accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Rendering used for command output.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, coloured on terminals.
    Pretty,
    /// One JSON object per line.
    Json,
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn tty_conflicts_with_fake_mode() {
        let result = Args::try_parse_from(["myo-raw", "--fake", "--tty", "/dev/ttyACM0", "info"]);

        let error = result.expect_err("--tty and --fake should conflict");
        assert_eq!(ErrorKind::ArgumentConflict, error.kind());
    }

    #[test]
    fn fake_fixture_flags_require_fake_mode() {
        let result = Args::try_parse_from(["myo-raw", "--fake-firmware", "0.9.0.1", "info"]);

        let error = result.expect_err("fake fixture flags should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn malformed_mac_is_rejected() {
        let result = Args::try_parse_from(["myo-raw", "--mac", "c0:ff:ee", "info"]);

        let error = result.expect_err("short address should fail");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[test]
    fn serial_mode_carries_tty() {
        let cli = Args::try_parse_from(["myo-raw", "--tty", "/dev/ttyACM1", "info"])
            .expect("serial arguments should parse");

        let (command, source) = cli.into_command_and_source();
        assert_matches!(command, Command::Info);
        assert_matches!(
            source,
            DeviceSource::Dongle(config) if config.tty() == Some("/dev/ttyACM1")
        );
    }

    #[test]
    fn fake_mode_builds_simulated_dongle() {
        let cli = Args::try_parse_from([
            "myo-raw",
            "--fake",
            "--fake-firmware",
            "0.9.0.1",
            "--fake-notifications",
            "0x11:50",
            "--mac",
            "c0:ff:ee:00:00:02",
            "info",
        ])
        .expect("valid fake arguments should parse");

        assert_eq!(
            Some("c0:ff:ee:00:00:02".parse().expect("valid address")),
            cli.mac()
        );
        let (_command, source) = cli.into_command_and_source();
        assert_matches!(source, DeviceSource::Fake(_));
    }

    #[test]
    fn global_options_parse_after_subcommand() {
        let cli = Args::try_parse_from([
            "myo-raw",
            "info",
            "--log-level",
            "debug",
            "--output",
            "json",
        ])
        .expect("global options should parse after the subcommand");

        assert_eq!(Some(LogLevel::Debug), cli.log_level());
        assert_eq!(Some(OutputFormat::Json), cli.output_format());
        assert_eq!(LevelFilter::DEBUG, LogLevel::Debug.as_level_filter());
    }

    #[test]
    fn durations_use_humantime_syntax() {
        assert_eq!(Ok(Duration::from_millis(250)), parse_duration("250ms"));
        assert!(parse_duration("soon").is_err());
    }
}
