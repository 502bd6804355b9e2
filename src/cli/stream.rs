use std::io;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use strum::IntoEnumIterator;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::bled112::{ByteStream, DeviceAddress};
use crate::cli::command::parse_duration;
use crate::cli::ui::{ConnectionView, EventView, StopView};
use crate::cli::{OutputFormat, OutputStyle, write_json_line};
use crate::myo::{
    ConnectionSummary, DataCategory, Myo, MyoEvent, Rgb, SleepMode, StopReason, SubscribeOptions,
    Vibration,
};
use crate::protocol::{EmgMode, ImuMode};

const LOGO_COLOUR: Rgb = Rgb::new(0, 255, 0);
const LINE_COLOUR: Rgb = Rgb::new(0, 0, 255);

/// Arguments for the `stream` command.
#[derive(Debug, Args)]
pub struct StreamArgs {
    /// EMG data to stream.
    #[arg(long, value_enum, default_value_t = EmgMode::Raw)]
    emg_mode: EmgMode,
    /// IMU data to stream.
    #[arg(long, value_enum, default_value_t = ImuMode::Data)]
    imu_mode: ImuMode,
    /// Do not stream arm and pose classifier events.
    #[arg(long)]
    no_classifier: bool,
    /// Do not stream battery level changes.
    #[arg(long)]
    no_battery: bool,
    /// Stop after this many events. If omitted, stream until Ctrl+C.
    #[arg(long)]
    max_events: Option<usize>,
    /// How long each poll of the dongle may block (e.g. `10ms`).
    #[arg(long, default_value = "50ms", value_parser = parse_duration)]
    poll_interval: Duration,
}

impl StreamArgs {
    /// Creates stream arguments with default modes and an optional event limit.
    ///
    /// ```
    /// use myo_raw::StreamArgs;
    ///
    /// let args = StreamArgs::new(Some(100));
    /// assert_eq!(Some(100), args.max_events());
    /// ```
    #[must_use]
    pub fn new(max_events: Option<usize>) -> Self {
        Self {
            emg_mode: EmgMode::default(),
            imu_mode: ImuMode::default(),
            no_classifier: false,
            no_battery: false,
            max_events,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Replaces the subscription modes.
    #[must_use]
    pub fn with_options(mut self, options: &SubscribeOptions) -> Self {
        self.emg_mode = options.emg_mode();
        self.imu_mode = options.imu_mode();
        self.no_classifier = !options.classifier();
        self.no_battery = !options.battery();
        self
    }

    /// Returns the optional event limit.
    #[must_use]
    pub fn max_events(&self) -> Option<usize> {
        self.max_events
    }

    pub(crate) fn subscribe_options(&self) -> SubscribeOptions {
        SubscribeOptions::builder()
            .emg_mode(self.emg_mode)
            .imu_mode(self.imu_mode)
            .classifier(!self.no_classifier)
            .battery(!self.no_battery)
            .build()
    }
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum StreamRecord<'a> {
    Connected { armband: &'a ConnectionSummary },
    Event { index: usize, event: &'a MyoEvent },
    Stopped { events: usize, reason: StopReason },
}

/// Executes the `stream` command on an open session.
#[instrument(
    skip(myo, args, out, style, cancel),
    level = "info",
    fields(max_events = ?args.max_events)
)]
pub(crate) fn run<S, W>(
    myo: &mut Myo<S>,
    filter: Option<DeviceAddress>,
    args: &StreamArgs,
    out: &mut W,
    style: OutputStyle,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: ByteStream,
    W: io::Write,
{
    let events = forward_events(myo);
    let summary = crate::cli::connect(myo, filter, Some(&args.subscribe_options()))?;
    match style.format() {
        OutputFormat::Pretty => {
            writeln!(out, "{}", ConnectionView::new(&summary, style.painter()))?;
        }
        OutputFormat::Json => {
            write_json_line(out, &StreamRecord::Connected { armband: &summary })?;
        }
    }

    myo.set_sleep_mode(SleepMode::NeverSleep)?;
    myo.vibrate(Vibration::Short)?;
    myo.set_leds(LOGO_COLOUR, LINE_COLOUR)?;

    let mut printed = 0;
    let reason = loop {
        let packet = if cancel.is_cancelled() {
            None
        } else {
            myo.poll(Some(args.poll_interval))?
        };
        for event in events.try_iter() {
            if cancel.is_cancelled() {
                break;
            }
            printed += 1;
            write_event(out, printed, &event, style)?;
            if args.max_events.is_some_and(|limit| printed >= limit) {
                info!(printed, "event limit reached");
                cancel.cancel();
            }
        }
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        if packet.is_none() && myo.stream().is_closed() {
            debug!("byte stream closed");
            break StopReason::StreamClosed;
        }
    };

    match style.format() {
        OutputFormat::Pretty => {
            writeln!(out)?;
            writeln!(out, "{}", StopView::new(printed, reason, style.painter()))?;
        }
        OutputFormat::Json => write_json_line(
            out,
            &StreamRecord::Stopped {
                events: printed,
                reason,
            },
        )?,
    }
    Ok(())
}

/// Registers a handler per category that forwards events to the returned
/// receiver.
fn forward_events<S: ByteStream>(myo: &mut Myo<S>) -> Receiver<MyoEvent> {
    let (sender, receiver) = mpsc::channel();
    for category in DataCategory::iter() {
        let sender = sender.clone();
        myo.add_handler(category, move |event| {
            sender.send(*event)?;
            Ok(())
        });
    }
    receiver
}

fn write_event<W: io::Write>(
    out: &mut W,
    index: usize,
    event: &MyoEvent,
    style: OutputStyle,
) -> Result<()> {
    match style.format() {
        OutputFormat::Pretty => {
            writeln!(out, "{}", EventView::new(index, event, style.painter()))?;
        }
        OutputFormat::Json => write_json_line(out, &StreamRecord::Event { index, event })?,
    }
    Ok(())
}
