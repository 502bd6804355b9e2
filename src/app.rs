use std::io;
use std::time::Duration;

use anyhow::Result;
use bon::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::bled112::{ByteStream, DeviceAddress, FakeDongle, SerialStream};
use crate::cli::{Command, DeviceSource, LogLevel, OutputFormat, OutputStyle};
use crate::error::{Interrupted, MyoError};
use crate::myo::Myo;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// How long a cancelled session may take to disconnect before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A session over either the serial dongle or the simulated one.
pub type DynMyo = Myo<Box<dyn ByteStream>>;

/// Settings shared by every command.
#[derive(Debug, Clone, Copy, Default, Builder)]
pub struct RunOptions {
    /// Connect only to this address.
    mac: Option<DeviceAddress>,
    /// Overrides `RUST_LOG`.
    log_level: Option<LogLevel>,
    /// Falls back to `pretty` on a terminal and `json` otherwise.
    output_format: Option<OutputFormat>,
}

/// Opens a session over the configured byte stream.
///
/// # Errors
///
/// Returns an error if the serial dongle cannot be found or opened.
pub fn open_session(source: DeviceSource) -> Result<DynMyo, MyoError> {
    let stream: Box<dyn ByteStream> = match source {
        DeviceSource::Dongle(config) => Box::new(SerialStream::open(&config)?),
        DeviceSource::Fake(config) => Box::new(FakeDongle::new(config)),
    };
    Ok(Myo::new(stream))
}

/// Runs one CLI command and hands the output writer back.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = myo_raw::Args::try_parse_from(["myo-raw", "--fake", "info"])?;
/// let (command, source) = args.into_command_and_source();
/// let out = myo_raw::run(command, source, Vec::new()).await?;
/// assert!(!out.is_empty());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the armband session
/// fails, or output writing fails.
pub async fn run<W>(command: Command, source: DeviceSource, out: W) -> Result<W>
where
    W: io::Write + Send + 'static,
{
    run_with_options(command, source, RunOptions::default(), out).await
}

/// Runs one CLI command with explicit shared settings.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the armband session
/// fails, or output writing fails.
pub async fn run_with_options<W>(
    command: Command,
    source: DeviceSource,
    options: RunOptions,
    out: W,
) -> Result<W>
where
    W: io::Write + Send + 'static,
{
    run_with_clients(command, source, options, out, &SystemTerminalClient).await
}

/// Runs one CLI command with an injected terminal client.
///
/// The session runs on a blocking thread. Ctrl+C cancels it cooperatively;
/// if it has not finished within a short grace period the call returns
/// [`Interrupted`].
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the armband session
/// fails, output writing fails, or the run is interrupted.
#[instrument(
    skip(command, source, out, terminal_client),
    level = "info",
    fields(command = %command_name(&command))
)]
pub async fn run_with_clients<W>(
    command: Command,
    source: DeviceSource,
    options: RunOptions,
    mut out: W,
    terminal_client: &dyn TerminalClient,
) -> Result<W>
where
    W: io::Write + Send + 'static,
{
    telemetry::initialise_tracing(
        "myo-raw",
        terminal_client.stderr_is_terminal(),
        options.log_level.map(LogLevel::as_level_filter),
    )?;

    let stdout_is_terminal = terminal_client.stdout_is_terminal();
    let format = options.output_format.unwrap_or(if stdout_is_terminal {
        OutputFormat::Pretty
    } else {
        OutputFormat::Json
    });
    let style = OutputStyle::new(format, stdout_is_terminal);
    let cancel = CancellationToken::new();

    let session_cancel = cancel.clone();
    let mut session = tokio::task::spawn_blocking(move || {
        execute(command, source, options.mac, &mut out, style, &session_cancel).map(|()| out)
    });

    tokio::select! {
        joined = &mut session => return joined?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("received Ctrl+C; stopping");
            cancel.cancel();
        }
    }

    match tokio::time::timeout(SHUTDOWN_GRACE, session).await {
        Ok(joined) => joined?,
        Err(_elapsed) => Err(Interrupted.into()),
    }
}

fn execute<W: io::Write>(
    command: Command,
    source: DeviceSource,
    filter: Option<DeviceAddress>,
    out: &mut W,
    style: OutputStyle,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut myo = open_session(source)?;

    let command_result = match &command {
        Command::Stream(args) => {
            crate::cli::stream::run(&mut myo, filter, args, out, style, cancel)
        }
        Command::Info => crate::cli::info::run(&mut myo, filter, out, style),
        Command::Control(args) => crate::cli::control::run(&mut myo, filter, args, out, style),
    };
    let close_result = myo.close();

    if let Err(error) = close_result {
        if command_result.is_ok() {
            return Err(error.into());
        }
        tracing::trace!(?error, "failed to close armband session cleanly");
    }

    command_result
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Stream(_args) => "stream",
        Command::Info => "info",
        Command::Control(_args) => "control",
    }
}
