//! Frame encoding and decoding.
//!
//! Pure functions, no state. Scaling from raw counts to physical units lives
//! here too, but is applied by the session since the scale factor depends on
//! which command produced the frame.

use super::{
    Command, ACCEL_FULL_SCALE_G, ACCEL_RAW_DIVISOR, AXIS_PAYLOAD_LEN, GYRO_FULL_SCALE_DPS,
    GYRO_RAW_DIVISOR, NOTIFICATION_FRAME_LEN, PREAMBLE,
};

/// A telemetry frame that passed header checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Command code from the header.
    pub command: u8,
    /// Raw axis readings in x, y, z order.
    pub axes: [i16; 3],
}

/// A notification converted to physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Acceleration in g.
    Accel([f64; 3]),
    /// Angular rate in degrees per second.
    Gyro([f64; 3]),
}

/// Build an outbound command frame: `55 AA <code> <len> <payload...>`.
///
/// The caller guarantees `payload.len() <= 255`.
pub fn encode_command(code: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= u8::MAX as usize);

    let mut frame = Vec::with_capacity(PREAMBLE.len() + 2 + payload.len());
    frame.extend_from_slice(&PREAMBLE);
    frame.push(code);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame
}

/// Decode an inbound telemetry frame.
///
/// Returns `None` for anything shorter than ten bytes, with a wrong preamble,
/// or whose length byte is not six. Partial and corrupt frames are routine on
/// a wireless link, so rejection is not an error. Trailing bytes past the
/// first ten are ignored.
pub fn decode_notification(bytes: &[u8]) -> Option<Notification> {
    if bytes.len() < NOTIFICATION_FRAME_LEN {
        return None;
    }
    if bytes[0] != PREAMBLE[0] || bytes[1] != PREAMBLE[1] {
        return None;
    }
    if bytes[3] != AXIS_PAYLOAD_LEN {
        return None;
    }

    let be16 = |i: usize| i16::from_be_bytes([bytes[i], bytes[i + 1]]);
    Some(Notification {
        command: bytes[2],
        axes: [be16(4), be16(6), be16(8)],
    })
}

/// Convert a decoded frame to physical units.
///
/// Returns `None` for command codes that are not accelerometer or gyroscope
/// telemetry.
pub fn scale_reading(notification: &Notification) -> Option<Reading> {
    let [x, y, z] = notification.axes;
    match Command::from_code(notification.command)? {
        Command::EnableAccel => Some(Reading::Accel([
            scale_accel(x),
            scale_accel(y),
            scale_accel(z),
        ])),
        Command::EnableGyro => Some(Reading::Gyro([
            scale_gyro(x),
            scale_gyro(y),
            scale_gyro(z),
        ])),
        Command::StopAll => None,
    }
}

/// Raw accelerometer count to g (±16 g full scale).
pub fn scale_accel(raw: i16) -> f64 {
    f64::from(raw) * ACCEL_FULL_SCALE_G / ACCEL_RAW_DIVISOR
}

/// Raw gyroscope count to degrees per second (±500 °/s full scale).
pub fn scale_gyro(raw: i16) -> f64 {
    f64::from(raw) * GYRO_FULL_SCALE_DPS / GYRO_RAW_DIVISOR
}

/// Build a telemetry frame as a unit would send it. Used by the simulated
/// transports and tests.
pub fn encode_notification(command: u8, axes: [i16; 3]) -> Vec<u8> {
    let mut payload = [0u8; AXIS_PAYLOAD_LEN as usize];
    for (chunk, value) in payload.chunks_exact_mut(2).zip(axes) {
        chunk.copy_from_slice(&value.to_be_bytes());
    }
    encode_command(command, &payload)
}
