//! Wire-level types shared by the codec and the reading sources.

use serde::{Deserialize, Serialize};

/// First byte of every frame.
pub const FRAME_HEADER: u8 = 0xAA;

/// Last byte of every frame.
pub const FRAME_TAIL: u8 = 0x55;

/// One-byte command codes understood by the cushion firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Command {
    /// Sensor data report (device -> host)
    SensorData = 0x01,
    /// Device status report (device -> host)
    DeviceStatus = 0x02,
    /// Posture alert raised by the firmware (device -> host)
    PostureAlert = 0x03,
    HeatingOn = 0x10,
    HeatingOff = 0x11,
    FanOn = 0x12,
    FanOff = 0x13,
    SetThresholds = 0x14,
    QueryStatus = 0x15,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Command::SensorData),
            0x02 => Some(Command::DeviceStatus),
            0x03 => Some(Command::PostureAlert),
            0x10 => Some(Command::HeatingOn),
            0x11 => Some(Command::HeatingOff),
            0x12 => Some(Command::FanOn),
            0x13 => Some(Command::FanOff),
            0x14 => Some(Command::SetThresholds),
            0x15 => Some(Command::QueryStatus),
            _ => None,
        }
    }

    /// Whether the device sends this command to the host.
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Command::SensorData | Command::DeviceStatus | Command::PostureAlert
        )
    }
}

/// One decoded, structurally valid frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub payload: Vec<u8>,
}

/// A single sample from the cushion.
///
/// Pressures are raw sensor magnitudes; the wire carries whole degrees and
/// percent, the synthetic generator produces fractional values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub pressure_left_front: u16,
    pub pressure_right_front: u16,
    pub pressure_left_back: u16,
    pub pressure_right_back: u16,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
    /// Capture time in milliseconds
    pub timestamp_ms: u64,
}

impl SensorReading {
    /// Build a reading from pressures ordered `[LF, RF, LB, RB]`.
    pub fn new(pressures: [u16; 4], temperature: f64, humidity: f64, timestamp_ms: u64) -> Self {
        Self {
            pressure_left_front: pressures[0],
            pressure_right_front: pressures[1],
            pressure_left_back: pressures[2],
            pressure_right_back: pressures[3],
            temperature,
            humidity,
            timestamp_ms,
        }
    }

    pub fn pressures(&self) -> [u16; 4] {
        [
            self.pressure_left_front,
            self.pressure_right_front,
            self.pressure_left_back,
            self.pressure_right_back,
        ]
    }

    pub fn total_pressure(&self) -> u32 {
        self.pressures().iter().map(|&p| p as u32).sum()
    }
}

/// Battery and radio state reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Battery level, percent
    pub battery_level: u8,
    /// Signal strength, device units
    pub signal_strength: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_match_firmware_table() {
        let table = [
            (Command::SensorData, 0x01),
            (Command::DeviceStatus, 0x02),
            (Command::PostureAlert, 0x03),
            (Command::HeatingOn, 0x10),
            (Command::HeatingOff, 0x11),
            (Command::FanOn, 0x12),
            (Command::FanOff, 0x13),
            (Command::SetThresholds, 0x14),
            (Command::QueryStatus, 0x15),
        ];

        for (command, code) in table {
            assert_eq!(command.code(), code);
            assert_eq!(Command::from_code(code), Some(command));
        }
        assert_eq!(Command::from_code(0x04), None);
        assert_eq!(Command::from_code(0xFF), None);
    }

    #[test]
    fn test_inbound_commands() {
        assert!(Command::SensorData.is_inbound());
        assert!(Command::PostureAlert.is_inbound());
        assert!(!Command::HeatingOn.is_inbound());
        assert!(!Command::QueryStatus.is_inbound());
    }

    #[test]
    fn test_total_pressure_does_not_overflow() {
        let reading = SensorReading::new([u16::MAX; 4], 25.0, 50.0, 0);
        assert_eq!(reading.total_pressure(), 4 * u16::MAX as u32);
    }
}
