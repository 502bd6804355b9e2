use tracing::debug;

use super::events::{Arm, EmgSample, ImuSample, MyoEvent, Pose, XDirection};
use crate::bled112::{Opcode, Packet};
use crate::error::DecodeError;
use crate::protocol::{Attribute, AttributeHandle};

const SMOOTHED_EMG_LEN: usize = 17;
const RAW_EMG_LEN: usize = 16;
const IMU_LEN: usize = 20;
const CLASSIFIER_MIN_LEN: usize = 3;
const BATTERY_LEN: usize = 1;
/// Position of the value type byte in an `attribute_value` event.
const VALUE_TYPE_OFFSET: usize = 3;
/// Bytes preceding the value in an `attribute_value` event.
const VALUE_OFFSET: usize = 5;

// attribute_value types pushed by the remote side. Read replies (0x00) and
// by-type or blob reads are answers to our own requests.
const VALUE_TYPE_NOTIFY: u8 = 0x01;
const VALUE_TYPE_INDICATE: u8 = 0x02;
const VALUE_TYPE_INDICATE_RSP_REQ: u8 = 0x05;

const CLASSIFIER_ARM_SYNCED: u8 = 1;
const CLASSIFIER_ARM_UNSYNCED: u8 = 2;
const CLASSIFIER_POSE: u8 = 3;

/// Handle and value carried by an `attclient attribute_value` event.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Notification<'a> {
    pub handle: AttributeHandle,
    pub value: &'a [u8],
}

impl<'a> Notification<'a> {
    /// Extracts the notification from a packet.
    ///
    /// Returns `None` for anything other than a well-formed attribute value
    /// event of notify or indicate type. Read replies are not notifications.
    #[must_use]
    pub fn from_packet(packet: &'a Packet) -> Option<Self> {
        if !packet.is_event_for(Opcode::ATTCLIENT_ATTRIBUTE_VALUE) {
            return None;
        }
        let payload = packet.payload();
        let value_type = *payload.get(VALUE_TYPE_OFFSET)?;
        if !matches!(
            value_type,
            VALUE_TYPE_NOTIFY | VALUE_TYPE_INDICATE | VALUE_TYPE_INDICATE_RSP_REQ
        ) {
            return None;
        }
        let handle = u16::from_le_bytes([*payload.get(1)?, *payload.get(2)?]);
        Some(Self {
            handle: AttributeHandle::new(handle),
            value: payload.get(VALUE_OFFSET..)?,
        })
    }
}

/// Decodes an attribute value into events.
///
/// Classifier messages other than arm sync and pose decode to no events.
///
/// # Errors
///
/// Returns an error when the handle has no decoder or the value is malformed.
pub fn decode_notification(
    handle: AttributeHandle,
    value: &[u8],
) -> Result<Vec<MyoEvent>, DecodeError> {
    let Some(attribute) = handle.attribute() else {
        return Err(DecodeError::UnknownHandle { handle });
    };

    match attribute {
        Attribute::SmoothedEmg => {
            let value = exact::<SMOOTHED_EMG_LEN>(handle, value)?;
            let mut values = [0u16; 8];
            for (slot, pair) in values.iter_mut().zip(value.chunks_exact(2)) {
                *slot = u16::from_le_bytes([pair[0], pair[1]]);
            }
            Ok(vec![MyoEvent::Emg(EmgSample::Smoothed {
                values,
                moving: value[16],
            })])
        }
        Attribute::EmgData0 | Attribute::EmgData1 | Attribute::EmgData2 | Attribute::EmgData3 => {
            let value = exact::<RAW_EMG_LEN>(handle, value)?;
            let characteristic = Attribute::RAW_EMG
                .iter()
                .position(|candidate| *candidate == attribute)
                .unwrap_or_default() as u8;
            Ok(value
                .chunks_exact(8)
                .map(|group| {
                    let mut values = [0i8; 8];
                    for (slot, byte) in values.iter_mut().zip(group) {
                        *slot = *byte as i8;
                    }
                    MyoEvent::Emg(EmgSample::Raw {
                        characteristic,
                        values,
                    })
                })
                .collect())
        }
        Attribute::ImuData => {
            let value = exact::<IMU_LEN>(handle, value)?;
            let mut words = [0i16; 10];
            for (slot, pair) in words.iter_mut().zip(value.chunks_exact(2)) {
                *slot = i16::from_le_bytes([pair[0], pair[1]]);
            }
            Ok(vec![MyoEvent::Imu(ImuSample {
                orientation: [words[0], words[1], words[2], words[3]],
                accelerometer: [words[4], words[5], words[6]],
                gyroscope: [words[7], words[8], words[9]],
            })])
        }
        Attribute::ClassifierEvent => {
            if value.len() < CLASSIFIER_MIN_LEN {
                return Err(DecodeError::TooShort {
                    handle,
                    minimum: CLASSIFIER_MIN_LEN,
                    actual: value.len(),
                });
            }
            decode_classifier(value[0], value[1], value[2])
        }
        Attribute::BatteryLevel => {
            let value = exact::<BATTERY_LEN>(handle, value)?;
            Ok(vec![MyoEvent::Battery(value[0])])
        }
        _ => Err(DecodeError::UnknownHandle { handle }),
    }
}

fn decode_classifier(kind: u8, value: u8, x_direction: u8) -> Result<Vec<MyoEvent>, DecodeError> {
    match kind {
        CLASSIFIER_ARM_SYNCED => Ok(vec![MyoEvent::Arm {
            arm: Arm::try_from(value)?,
            x_direction: XDirection::try_from(x_direction)?,
        }]),
        CLASSIFIER_ARM_UNSYNCED => Ok(vec![MyoEvent::Arm {
            arm: Arm::Unknown,
            x_direction: XDirection::Unknown,
        }]),
        CLASSIFIER_POSE => Ok(vec![MyoEvent::Pose(Pose::try_from(value)?)]),
        other => {
            debug!(kind = other, "ignoring classifier message");
            Ok(Vec::new())
        }
    }
}

fn exact<const N: usize>(handle: AttributeHandle, value: &[u8]) -> Result<&[u8; N], DecodeError> {
    value.try_into().map_err(|_| DecodeError::UnexpectedLength {
        handle,
        expected: N,
        actual: value.len(),
    })
}
