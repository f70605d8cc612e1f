//! Decoded motion readings and the host clock that stamps them.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::protocol::Reading;

static HOST_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Seconds on the host's monotonic clock.
///
/// The epoch is fixed the first time any timestamp is taken in the process,
/// so values are comparable across devices but meaningless across runs.
pub fn host_time_s() -> f64 {
    HOST_EPOCH.elapsed().as_secs_f64()
}

/// Which sensor produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Accelerometer frame; `accel_g` is populated.
    Accel,
    /// Gyroscope frame; `gyro_dps` is populated.
    Gyro,
}

/// One decoded motion reading.
///
/// The units deliver accelerometer and gyroscope data as separate frames, so
/// exactly one of `accel_g` / `gyro_dps` carries data and the other is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Host receipt time, seconds on the monotonic clock (see [`host_time_s`]).
    pub timestamp_s: f64,
    /// Sensor that produced the frame.
    pub kind: SampleKind,
    /// Acceleration in g (x, y, z).
    pub accel_g: [f64; 3],
    /// Angular rate in degrees per second (x, y, z).
    pub gyro_dps: [f64; 3],
    /// Die temperature in °C. The current firmware never reports it.
    pub temperature_c: Option<f64>,
}

impl Sample {
    /// Build an accelerometer sample.
    pub fn accel(timestamp_s: f64, accel_g: [f64; 3]) -> Self {
        Self {
            timestamp_s,
            kind: SampleKind::Accel,
            accel_g,
            gyro_dps: [0.0; 3],
            temperature_c: None,
        }
    }

    /// Build a gyroscope sample.
    pub fn gyro(timestamp_s: f64, gyro_dps: [f64; 3]) -> Self {
        Self {
            timestamp_s,
            kind: SampleKind::Gyro,
            accel_g: [0.0; 3],
            gyro_dps,
            temperature_c: None,
        }
    }

    /// Build a sample from a scaled reading.
    pub fn from_reading(timestamp_s: f64, reading: Reading) -> Self {
        match reading {
            Reading::Accel(a) => Self::accel(timestamp_s, a),
            Reading::Gyro(g) => Self::gyro(timestamp_s, g),
        }
    }

    /// True when at least one acceleration axis is nonzero.
    ///
    /// A frame reading exactly zero on all three axes carries no gravity
    /// information and is indistinguishable from an unset field.
    pub fn has_accel(&self) -> bool {
        self.accel_g.iter().any(|&v| v != 0.0)
    }

    /// True for gyroscope frames.
    pub fn has_gyro(&self) -> bool {
        self.kind == SampleKind::Gyro
    }

    /// Acceleration magnitude in g.
    pub fn accel_magnitude(&self) -> f64 {
        norm(self.accel_g)
    }

    /// Angular rate magnitude in degrees per second.
    pub fn gyro_magnitude(&self) -> f64 {
        norm(self.gyro_dps)
    }
}

pub(crate) fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}
