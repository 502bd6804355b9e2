use std::io;

use anyhow::Result;
use serde::Serialize;
use tracing::instrument;

use crate::bled112::{ByteStream, DeviceAddress};
use crate::cli::ui::ConnectionView;
use crate::cli::{OutputFormat, OutputStyle, write_json_line};
use crate::myo::{ConnectionSummary, Myo};

#[derive(Serialize)]
struct InfoReport<'a> {
    #[serde(flatten)]
    armband: &'a ConnectionSummary,
    name: Option<&'a str>,
    battery_level: Option<u8>,
}

/// Executes the `info` command on an open session.
#[instrument(skip(myo, out, style), level = "info")]
pub(crate) fn run<S, W>(
    myo: &mut Myo<S>,
    filter: Option<DeviceAddress>,
    out: &mut W,
    style: OutputStyle,
) -> Result<()>
where
    S: ByteStream,
    W: io::Write,
{
    let summary = crate::cli::connect(myo, filter, None)?;
    let name = myo.get_name()?;
    let battery_level = myo.get_battery_level()?;

    match style.format() {
        OutputFormat::Pretty => {
            let view = ConnectionView::new(&summary, style.painter())
                .with_status(name.as_deref(), battery_level);
            writeln!(out, "{view}")?;
        }
        OutputFormat::Json => write_json_line(
            out,
            &InfoReport {
                armband: &summary,
                name: name.as_deref(),
                battery_level,
            },
        )?,
    }
    Ok(())
}
