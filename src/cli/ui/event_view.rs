use std::fmt::{self, Display, Formatter};

use crate::myo::{EmgSample, MyoEvent};

use super::painter::Painter;

/// Renders one decoded event as a single line.
pub(crate) struct EventView<'a> {
    index: usize,
    event: &'a MyoEvent,
    painter: &'a Painter,
}

impl<'a> EventView<'a> {
    pub(crate) fn new(index: usize, event: &'a MyoEvent, painter: &'a Painter) -> Self {
        Self {
            index,
            event,
            painter,
        }
    }
}

impl Display for EventView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ",
            self.painter.muted(format!("#{:<5}", self.index)),
            self.painter.category(self.event.category())
        )?;

        match self.event {
            MyoEvent::Emg(EmgSample::Smoothed { values, moving }) => write!(
                f,
                "smoothed {} moving={}",
                self.painter.value(format!("{values:?}")),
                moving
            ),
            MyoEvent::Emg(EmgSample::Raw {
                characteristic,
                values,
            }) => write!(
                f,
                "raw[{characteristic}] {}",
                self.painter.value(format!("{values:?}"))
            ),
            MyoEvent::Imu(sample) => write!(
                f,
                "quat={:?} acc={:?} gyro={:?}",
                sample.orientation, sample.accelerometer, sample.gyroscope
            ),
            MyoEvent::Arm { arm, x_direction } => write!(
                f,
                "{} x={}",
                self.painter.value(arm.to_string()),
                x_direction
            ),
            MyoEvent::Pose(pose) => write!(f, "{}", self.painter.success(pose.to_string())),
            MyoEvent::Battery(level) => write!(f, "{}%", self.painter.value(level.to_string())),
        }
    }
}
