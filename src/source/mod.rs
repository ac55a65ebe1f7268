//! Where sensor frames come from.
//!
//! A source turns whatever transport it owns into [`LinkEvent`]s. The engine
//! polls it once per tick and never blocks on it.

pub mod mock;
pub mod stream;

use crate::protocol::codec::{reading_from_payload, status_from_payload, DecodeError};
use crate::protocol::types::{Command, DeviceStatus, Frame, SensorReading};

pub use mock::{MockCushion, MockSource};
pub use stream::{spawn_reader, StreamSource};

/// Something that arrived over the link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Reading(SensorReading),
    Status(DeviceStatus),
    /// Posture alert raised by the firmware itself
    DeviceAlert { payload: Vec<u8> },
    /// A frame was rejected
    Dropped(DecodeError),
    /// Bytes skipped while looking for a frame header
    Noise { bytes: u64 },
}

/// Source errors.
#[derive(Debug)]
pub enum SourceError {
    /// The transport has gone away
    Disconnected,
    IoError(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Disconnected => write!(f, "Source disconnected"),
            SourceError::IoError(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// A pollable supplier of link events.
pub trait ReadingSource: Send {
    /// Drain everything that has arrived since the last poll.
    ///
    /// `now_ms` stamps any reading decoded during this call.
    fn poll(&mut self, now_ms: u64) -> Result<Vec<LinkEvent>, SourceError>;

    fn name(&self) -> &str;
}

/// Route a decoded frame by command.
///
/// Host-to-device commands echoed back on the link are ignored.
pub fn route_frame(frame: &Frame, now_ms: u64) -> Option<LinkEvent> {
    match frame.command {
        Command::SensorData => Some(
            reading_from_payload(&frame.payload, now_ms)
                .map_or_else(LinkEvent::Dropped, LinkEvent::Reading),
        ),
        Command::DeviceStatus => Some(
            status_from_payload(&frame.payload).map_or_else(LinkEvent::Dropped, LinkEvent::Status),
        ),
        Command::PostureAlert => Some(LinkEvent::DeviceAlert {
            payload: frame.payload.clone(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_sensor_frame() {
        let frame = Frame {
            command: Command::SensorData,
            payload: vec![0, 100, 0, 100, 0, 120, 0, 120, 25, 60],
        };
        match route_frame(&frame, 42) {
            Some(LinkEvent::Reading(r)) => {
                assert_eq!(r.total_pressure(), 440);
                assert_eq!(r.timestamp_ms, 42);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_route_short_sensor_payload_is_dropped() {
        let frame = Frame {
            command: Command::SensorData,
            payload: vec![1, 2, 3],
        };
        assert_eq!(
            route_frame(&frame, 0),
            Some(LinkEvent::Dropped(DecodeError::PayloadTooShort { len: 3 }))
        );
    }

    #[test]
    fn test_route_status_and_alert() {
        let status = Frame {
            command: Command::DeviceStatus,
            payload: vec![87, 3],
        };
        assert_eq!(
            route_frame(&status, 0),
            Some(LinkEvent::Status(DeviceStatus {
                battery_level: 87,
                signal_strength: 3
            }))
        );

        let alert = Frame {
            command: Command::PostureAlert,
            payload: vec![4],
        };
        assert_eq!(
            route_frame(&alert, 0),
            Some(LinkEvent::DeviceAlert { payload: vec![4] })
        );
    }

    #[test]
    fn test_outbound_echo_ignored() {
        let frame = Frame {
            command: Command::HeatingOn,
            payload: vec![],
        };
        assert_eq!(route_frame(&frame, 0), None);
    }
}
