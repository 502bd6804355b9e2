use std::fmt::{self, Display, Formatter};

use crate::myo::{ConnectionSummary, StopReason};

use super::painter::Painter;
use super::table::Table;

/// Renders an established connection with optional device status.
pub(crate) struct ConnectionView<'a> {
    summary: &'a ConnectionSummary,
    name: Option<&'a str>,
    battery_level: Option<u8>,
    painter: &'a Painter,
}

impl<'a> ConnectionView<'a> {
    pub(crate) fn new(summary: &'a ConnectionSummary, painter: &'a Painter) -> Self {
        Self {
            summary,
            name: None,
            battery_level: None,
            painter,
        }
    }

    pub(crate) fn with_status(mut self, name: Option<&'a str>, battery_level: Option<u8>) -> Self {
        self.name = name;
        self.battery_level = battery_level;
        self
    }

    fn optional(&self, value: Option<String>) -> String {
        match value {
            Some(value) => self.painter.value(value),
            None => self.painter.warning("<unknown>"),
        }
    }
}

impl Display for ConnectionView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut rows = vec![
            ("address", self.painter.value(self.summary.address.to_string())),
            (
                "connection",
                self.painter.value(self.summary.connection.to_string()),
            ),
            (
                "firmware",
                self.painter.value(self.summary.firmware.to_string()),
            ),
            (
                "protocol",
                self.painter.value(self.summary.protocol.to_string()),
            ),
        ];
        if self.name.is_some() || self.battery_level.is_some() {
            rows.push(("name", self.optional(self.name.map(str::to_string))));
            rows.push((
                "battery",
                self.optional(self.battery_level.map(|level| format!("{level}%"))),
            ));
        }

        write!(f, "{}", self.painter.heading("Connected armband:"))?;
        write!(f, "\n{}", Table::key_value(self.painter, rows))
    }
}

/// Renders the end of a streaming run.
pub(crate) struct StopView<'a> {
    events: usize,
    reason: StopReason,
    painter: &'a Painter,
}

impl<'a> StopView<'a> {
    pub(crate) fn new(events: usize, reason: StopReason, painter: &'a Painter) -> Self {
        Self {
            events,
            reason,
            painter,
        }
    }
}

impl Display for StopView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            StopReason::Cancelled => self.painter.success("stopped"),
            StopReason::StreamClosed => self.painter.warning("dongle stream closed"),
        };
        write!(
            f,
            "{reason} {}",
            self.painter.muted(format!("after {} events", self.events))
        )
    }
}
