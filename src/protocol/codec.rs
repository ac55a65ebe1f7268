//! Frame encoding and decoding.
//!
//! Every frame on the link has the shape
//!
//! ```text
//! [0xAA][command][len][payload; len][checksum][0x55]
//! ```
//!
//! where `checksum` is the sum of `command`, `len` and every payload byte,
//! modulo 256.

use crate::clock::Clock;
use crate::config::ThresholdConfig;
use crate::protocol::types::{
    Command, DeviceStatus, Frame, SensorReading, FRAME_HEADER, FRAME_TAIL,
};

/// Largest payload a single length byte can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Header, command, length, checksum and tail.
pub const FRAME_OVERHEAD: usize = 5;

/// Largest frame the link can carry.
pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD_LEN + FRAME_OVERHEAD;

/// Shortest byte sequence the sensor-reading decoder will look at.
pub const MIN_READING_FRAME_LEN: usize = 6;

/// Four big-endian pressure channels, one temperature byte, one humidity byte.
pub const SENSOR_PAYLOAD_LEN: usize = 10;

/// Device status payload: battery percent, signal strength.
pub const STATUS_PAYLOAD_LEN: usize = 2;

/// Reasons an inbound frame is rejected.
///
/// All of these are recoverable: the frame is dropped and the link carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    TooShort { len: usize },
    BadHeader { found: u8 },
    UnexpectedCommand { code: u8 },
    Truncated { declared: usize, available: usize },
    ChecksumMismatch { expected: u8, found: u8 },
    BadTail { found: u8 },
    PayloadTooShort { len: usize },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::TooShort { len } => write!(f, "Frame too short: {len} bytes"),
            DecodeError::BadHeader { found } => write!(f, "Bad frame header: 0x{found:02X}"),
            DecodeError::UnexpectedCommand { code } => {
                write!(f, "Unexpected command: 0x{code:02X}")
            }
            DecodeError::Truncated {
                declared,
                available,
            } => write!(
                f,
                "Truncated frame: payload declares {declared} bytes, {available} available"
            ),
            DecodeError::ChecksumMismatch { expected, found } => write!(
                f,
                "Checksum mismatch: expected 0x{expected:02X}, found 0x{found:02X}"
            ),
            DecodeError::BadTail { found } => write!(f, "Bad frame tail: 0x{found:02X}"),
            DecodeError::PayloadTooShort { len } => {
                write!(f, "Payload too short: {len} bytes")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Caller errors when building a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    InvalidPayload { len: usize },
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::InvalidPayload { len } => write!(
                f,
                "Invalid payload: {len} bytes exceeds the {MAX_PAYLOAD_LEN}-byte limit"
            ),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Sum of the given bytes modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Build a complete frame for `command` carrying `payload`.
pub fn encode(command: Command, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::InvalidPayload { len: payload.len() });
    }

    let len = payload.len() as u8;
    let sum = checksum(payload)
        .wrapping_add(command.code())
        .wrapping_add(len);

    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.push(FRAME_HEADER);
    frame.push(command.code());
    frame.push(len);
    frame.extend_from_slice(payload);
    frame.push(sum);
    frame.push(FRAME_TAIL);
    Ok(frame)
}

/// Heating on/off command frame.
pub fn heating_command(on: bool) -> Vec<u8> {
    let command = if on {
        Command::HeatingOn
    } else {
        Command::HeatingOff
    };
    empty_frame(command)
}

/// Fan on/off command frame.
pub fn fan_command(on: bool) -> Vec<u8> {
    let command = if on { Command::FanOn } else { Command::FanOff };
    empty_frame(command)
}

/// Status query frame.
pub fn query_status_command() -> Vec<u8> {
    empty_frame(Command::QueryStatus)
}

/// Push thresholds to the device.
///
/// Payload: temp min, temp max, humidity max, humidity min, sitting max
/// (minutes). Each value is rounded and clamped into one byte.
pub fn threshold_command(thresholds: &ThresholdConfig) -> Vec<u8> {
    let payload = [
        clamp_to_byte(thresholds.temp_min),
        clamp_to_byte(thresholds.temp_max),
        clamp_to_byte(thresholds.humidity_max),
        clamp_to_byte(thresholds.humidity_min),
        thresholds.sitting_duration_max_minutes.min(u8::MAX as u32) as u8,
    ];
    frame_from_fixed(Command::SetThresholds, &payload)
}

fn clamp_to_byte(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, u8::MAX as f64) as u8
}

fn empty_frame(command: Command) -> Vec<u8> {
    frame_from_fixed(command, &[])
}

/// Frames whose payload is a fixed, small array cannot exceed the limit.
fn frame_from_fixed(command: Command, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u8;
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.push(FRAME_HEADER);
    frame.push(command.code());
    frame.push(len);
    frame.extend_from_slice(payload);
    frame.push(checksum(payload).wrapping_add(command.code()).wrapping_add(len));
    frame.push(FRAME_TAIL);
    frame
}

/// Decode a sensor-data frame into a reading stamped with `clock`.
///
/// Checks run in a fixed order and stop at the first failure: length,
/// header, command, declared length, checksum, tail, payload size.
pub fn decode_reading(bytes: &[u8], clock: &dyn Clock) -> Result<SensorReading, DecodeError> {
    if bytes.len() < MIN_READING_FRAME_LEN {
        return Err(DecodeError::TooShort { len: bytes.len() });
    }
    if bytes[0] != FRAME_HEADER {
        return Err(DecodeError::BadHeader { found: bytes[0] });
    }
    if bytes[1] != Command::SensorData.code() {
        return Err(DecodeError::UnexpectedCommand { code: bytes[1] });
    }

    let (payload, _) = split_body(bytes)?;
    reading_from_payload(payload, clock.now_ms())
}

/// Decode any known frame, leaving routing to the caller.
///
/// Returns the frame and the number of bytes it occupied in `bytes`.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), DecodeError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(DecodeError::TooShort { len: bytes.len() });
    }
    if bytes[0] != FRAME_HEADER {
        return Err(DecodeError::BadHeader { found: bytes[0] });
    }
    let command =
        Command::from_code(bytes[1]).ok_or(DecodeError::UnexpectedCommand { code: bytes[1] })?;

    let (payload, consumed) = split_body(bytes)?;
    Ok((
        Frame {
            command,
            payload: payload.to_vec(),
        },
        consumed,
    ))
}

/// Extract a reading from a sensor-data payload.
pub fn reading_from_payload(payload: &[u8], timestamp_ms: u64) -> Result<SensorReading, DecodeError> {
    if payload.len() < SENSOR_PAYLOAD_LEN {
        return Err(DecodeError::PayloadTooShort { len: payload.len() });
    }

    let channel = |i: usize| u16::from_be_bytes([payload[i], payload[i + 1]]);
    Ok(SensorReading::new(
        [channel(0), channel(2), channel(4), channel(6)],
        payload[8] as f64,
        payload[9] as f64,
        timestamp_ms,
    ))
}

/// Extract the device status from a status payload.
pub fn status_from_payload(payload: &[u8]) -> Result<DeviceStatus, DecodeError> {
    if payload.len() < STATUS_PAYLOAD_LEN {
        return Err(DecodeError::PayloadTooShort { len: payload.len() });
    }
    Ok(DeviceStatus {
        battery_level: payload[0].min(100),
        signal_strength: payload[1],
    })
}

/// Encode a reading as a sensor-data payload.
///
/// Temperature and humidity are rounded and clamped into one byte each.
pub fn payload_from_reading(reading: &SensorReading) -> [u8; SENSOR_PAYLOAD_LEN] {
    let mut payload = [0u8; SENSOR_PAYLOAD_LEN];
    for (i, pressure) in reading.pressures().iter().enumerate() {
        payload[i * 2..i * 2 + 2].copy_from_slice(&pressure.to_be_bytes());
    }
    payload[8] = clamp_to_byte(reading.temperature);
    payload[9] = clamp_to_byte(reading.humidity);
    payload
}

/// Validate length, checksum and tail of a frame whose header and command
/// have already been checked.
fn split_body(bytes: &[u8]) -> Result<(&[u8], usize), DecodeError> {
    let declared = bytes[2] as usize;
    let available = bytes.len() - 3;
    if available < declared + 2 {
        return Err(DecodeError::Truncated {
            declared,
            available,
        });
    }

    let payload = &bytes[3..3 + declared];
    let expected = checksum(&bytes[1..3 + declared]);
    let found = bytes[3 + declared];
    if expected != found {
        return Err(DecodeError::ChecksumMismatch { expected, found });
    }

    let tail = bytes[4 + declared];
    if tail != FRAME_TAIL {
        return Err(DecodeError::BadTail { found: tail });
    }

    Ok((payload, declared + FRAME_OVERHEAD))
}
