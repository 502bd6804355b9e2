pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod info;
pub(crate) mod stream;
pub(crate) mod ui;

use std::io;

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::instrument;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::bled112::{ByteStream, DeviceAddress};
use crate::error::MyoError;
use crate::myo::{ConnectionSummary, Myo, SubscribeOptions};
use crate::protocol::MYO_SERVICE_ID;

use self::ui::Painter;

pub use self::command::{Args, Command, DeviceSource, FakeArgs, LogLevel, OutputFormat};
pub use self::control::{
    ControlAction, ControlArgs, LedArgs, SetNameArgs, SleepModeArgs, VibrateArgs,
};
pub use self::stream::StreamArgs;

/// How a command renders its results.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OutputStyle {
    format: OutputFormat,
    painter: Painter,
}

impl OutputStyle {
    pub(crate) fn new(format: OutputFormat, use_colour: bool) -> Self {
        Self {
            format,
            painter: Painter::new(use_colour && format == OutputFormat::Pretty),
        }
    }

    pub(crate) fn format(&self) -> OutputFormat {
        self.format
    }

    pub(crate) fn painter(&self) -> &Painter {
        &self.painter
    }
}

/// Scans for the first armband and connects to it.
///
/// With `subscribe`, streaming is enabled as well; otherwise the session
/// stops after reading the firmware version.
#[instrument(skip(myo, subscribe), level = "info", fields(filter = ?filter))]
pub(crate) fn connect<S: ByteStream>(
    myo: &mut Myo<S>,
    filter: Option<DeviceAddress>,
    subscribe: Option<&SubscribeOptions>,
) -> Result<ConnectionSummary, MyoError> {
    let span = tracing::Span::current();
    span.pb_set_message("Scanning for Myo armbands and connecting");

    let result = match subscribe {
        Some(options) => myo.connect_first(filter, options),
        None => connect_without_streaming(myo, filter),
    };

    let finish_message = match &result {
        Ok(summary) => format!("{} Connected to {}", "✓".green(), summary.address),
        Err(_error) => format!("{} Connection failed", "✗".red()),
    };
    span.pb_set_finish_message(&finish_message);
    result
}

fn connect_without_streaming<S: ByteStream>(
    myo: &mut Myo<S>,
    filter: Option<DeviceAddress>,
) -> Result<ConnectionSummary, MyoError> {
    let address = myo.scan(&MYO_SERVICE_ID, filter)?;
    let connection = myo.connect(address)?;
    let firmware = myo.read_version()?;
    Ok(ConnectionSummary {
        address,
        connection,
        firmware,
        protocol: firmware.variant(),
    })
}

pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
