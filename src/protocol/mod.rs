//! Wire protocol of the IMU units.
//!
//! Every message, in either direction, shares one header:
//!
//! ```text
//! +------+------+---------+---------+-----------------+
//! | 0x55 | 0xAA | command | length  | payload[length] |
//! +------+------+---------+---------+-----------------+
//! ```
//!
//! Commands are written to [`WRITE_CHARACTERISTIC`]; telemetry arrives as
//! notifications on [`NOTIFY_CHARACTERISTIC`], one frame per sensor type with a
//! six byte payload holding three big-endian `i16` axis readings.

pub mod codec;

pub use codec::{decode_notification, encode_command, scale_reading, Notification, Reading};

use uuid::Uuid;

/// GATT service exposing the IMU command and telemetry characteristics.
pub const IMU_SERVICE: Uuid = Uuid::from_u128(0x0000b3a0_0000_1000_8000_00805f9b34fb);

/// Characteristic delivering telemetry frames as notifications.
pub const NOTIFY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000b3a1_0000_1000_8000_00805f9b34fb);

/// Characteristic accepting command frames (write with response).
pub const WRITE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000b3a2_0000_1000_8000_00805f9b34fb);

/// Two byte sync preamble that starts every frame.
pub const PREAMBLE: [u8; 2] = [0x55, 0xAA];

/// Header size: preamble, command code and length byte.
pub const HEADER_LEN: usize = 4;

/// Payload length of a telemetry frame (three `i16` axes).
pub const AXIS_PAYLOAD_LEN: u8 = 6;

/// Total size of a telemetry frame.
pub const NOTIFICATION_FRAME_LEN: usize = HEADER_LEN + AXIS_PAYLOAD_LEN as usize;

/// Accelerometer full scale in g.
pub const ACCEL_FULL_SCALE_G: f64 = 16.0;

/// Raw count matching [`ACCEL_FULL_SCALE_G`].
pub const ACCEL_RAW_DIVISOR: f64 = 32768.0;

/// Gyroscope full scale in degrees per second.
pub const GYRO_FULL_SCALE_DPS: f64 = 500.0;

/// Raw count matching [`GYRO_FULL_SCALE_DPS`]. Empirically derived for this
/// unit, not the nominal 32768.
pub const GYRO_RAW_DIVISOR: f64 = 28571.0;

/// Command codes understood by the units.
///
/// The enable codes double as the command code of the telemetry frames the
/// unit sends back for that sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Start streaming accelerometer frames.
    EnableAccel = 0x08,
    /// Start streaming gyroscope frames.
    EnableGyro = 0x0A,
    /// Stop every sensor stream.
    StopAll = 0xF0,
}

impl Command {
    /// Raw command byte.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a raw command byte.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x08 => Some(Command::EnableAccel),
            0x0A => Some(Command::EnableGyro),
            0xF0 => Some(Command::StopAll),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::EnableAccel => write!(f, "enable_accel"),
            Command::EnableGyro => write!(f, "enable_gyro"),
            Command::StopAll => write!(f, "stop_all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn characteristic_uuids_render_in_canonical_form() {
        assert_eq!(
            IMU_SERVICE.to_string(),
            "0000b3a0-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            NOTIFY_CHARACTERISTIC.to_string(),
            "0000b3a1-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            WRITE_CHARACTERISTIC.to_string(),
            "0000b3a2-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn command_codes_round_trip() {
        for cmd in [Command::EnableAccel, Command::EnableGyro, Command::StopAll] {
            assert_eq!(Command::from_code(cmd.code()), Some(cmd));
        }
        assert_eq!(Command::from_code(0x11), None);
    }
}
