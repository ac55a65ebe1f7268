//! Binary wire protocol spoken by the cushion sensor unit.

pub mod codec;
pub mod stream;
pub mod types;

pub use codec::{
    decode_frame, decode_reading, encode, fan_command, heating_command, query_status_command,
    threshold_command, DecodeError, EncodeError,
};
pub use stream::FrameReader;
pub use types::{Command, DeviceStatus, Frame, SensorReading, FRAME_HEADER, FRAME_TAIL};
