use std::io;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::instrument;

use crate::bled112::{ByteStream, DeviceAddress};
use crate::cli::{OutputFormat, OutputStyle, write_json_line};
use crate::myo::{Myo, Rgb, SleepMode, Vibration};

/// JSON result emitted by a `control` action.
#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlResult {
    Vibrate { length: String },
    Leds { logo: String, line: String },
    SleepMode { mode: String },
    SetName { name: String },
    DeepSleep,
}

/// Arguments for the `control` command.
#[derive(Debug, Args)]
pub struct ControlArgs {
    #[command(subcommand)]
    action: ControlAction,
}

impl ControlArgs {
    /// Creates control arguments for one action.
    ///
    /// ```
    /// use myo_raw::{ControlAction, ControlArgs, VibrateArgs, Vibration};
    ///
    /// let args = ControlArgs::new(ControlAction::Vibrate(VibrateArgs::new(Vibration::Long)));
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(action: ControlAction) -> Self {
        Self { action }
    }
}

/// Action performed by the `control` command.
#[derive(Debug, Subcommand)]
pub enum ControlAction {
    /// Pulse the vibration motor.
    Vibrate(VibrateArgs),
    /// Set the logo and bar LED colours.
    Leds(LedArgs),
    /// Allow or prevent sleeping while idle.
    SleepMode(SleepModeArgs),
    /// Rename the armband.
    SetName(SetNameArgs),
    /// Put the armband into deep sleep. Only USB charging wakes it again.
    DeepSleep,
}

/// Arguments for `control vibrate`.
#[derive(Debug, Args)]
pub struct VibrateArgs {
    /// Pulse length.
    #[arg(value_enum, default_value_t = Vibration::Short)]
    length: Vibration,
}

impl VibrateArgs {
    #[must_use]
    pub fn new(length: Vibration) -> Self {
        Self { length }
    }
}

/// Arguments for `control leds`.
#[derive(Debug, Args)]
pub struct LedArgs {
    /// Logo colour as six hex digits (e.g. `00ff00`).
    logo: Rgb,
    /// Bar colour as six hex digits (e.g. `#0000ff`).
    line: Rgb,
}

impl LedArgs {
    #[must_use]
    pub fn new(logo: Rgb, line: Rgb) -> Self {
        Self { logo, line }
    }
}

/// Arguments for `control sleep-mode`.
#[derive(Debug, Args)]
pub struct SleepModeArgs {
    #[arg(value_enum)]
    mode: SleepMode,
}

impl SleepModeArgs {
    #[must_use]
    pub fn new(mode: SleepMode) -> Self {
        Self { mode }
    }
}

/// Arguments for `control set-name`.
#[derive(Debug, Args)]
pub struct SetNameArgs {
    /// New device name, at most 251 bytes of UTF-8.
    name: String,
}

impl SetNameArgs {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Executes the `control` command on an open session.
#[instrument(skip(myo, args, out, style), level = "info", fields(action = ?args.action))]
pub(crate) fn run<S, W>(
    myo: &mut Myo<S>,
    filter: Option<DeviceAddress>,
    args: &ControlArgs,
    out: &mut W,
    style: OutputStyle,
) -> Result<()>
where
    S: ByteStream,
    W: io::Write,
{
    crate::cli::connect(myo, filter, None)?;

    let (message, result) = match &args.action {
        ControlAction::Vibrate(vibrate_args) => {
            myo.vibrate(vibrate_args.length)?;
            (
                format!("Vibrated: {}", vibrate_args.length),
                ControlResult::Vibrate {
                    length: vibrate_args.length.to_string(),
                },
            )
        }
        ControlAction::Leds(led_args) => {
            myo.set_leds(led_args.logo, led_args.line)?;
            (
                format!("Applied LEDs: logo {} line {}", led_args.logo, led_args.line),
                ControlResult::Leds {
                    logo: led_args.logo.to_string(),
                    line: led_args.line.to_string(),
                },
            )
        }
        ControlAction::SleepMode(sleep_args) => {
            myo.set_sleep_mode(sleep_args.mode)?;
            (
                format!("Applied sleep mode: {}", sleep_args.mode),
                ControlResult::SleepMode {
                    mode: sleep_args.mode.to_string(),
                },
            )
        }
        ControlAction::SetName(name_args) => {
            myo.set_name(&name_args.name)?;
            (
                format!("Renamed armband: {}", name_args.name),
                ControlResult::SetName {
                    name: name_args.name.clone(),
                },
            )
        }
        ControlAction::DeepSleep => {
            myo.deep_sleep()?;
            (
                "Sent deep sleep; charge over USB to wake".to_string(),
                ControlResult::DeepSleep,
            )
        }
    };

    match style.format() {
        OutputFormat::Pretty => writeln!(out, "{}", style.painter().success(message))?,
        OutputFormat::Json => write_json_line(out, &result)?,
    }
    Ok(())
}
