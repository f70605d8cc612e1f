//! Evaluation Engine
//!
//! Pure function from one device's measurement-window log to a [`QaResult`].
//!
//! # Metrics
//!
//! | Metric | Source | Definition |
//! |--------|--------|------------|
//! | `gravity_mean_g` | accel | mean of `|a|` |
//! | `mac_deg` | gyro | mean of `|ω̄|·Δt` over consecutive gyro samples (trapezoidal) |
//! | `noise_sigma` | gyro | `sqrt(σx² + σy² + σz²)`, population σ per axis, °/s |
//! | `drift_deg_per_min` | gyro | `|slope|·60`, per-axis least-squares slope of integrated angle |
//! | `abnormal_count` | gyro | samples with `|ω|` above stillness or angular change above threshold |
//!
//! # Verdict
//!
//! Checked in order, first match wins:
//! 1. **Fail**: empty log, abnormal count over budget, MAC over limit, drift over limit.
//! 2. **Warn**: any metric at or above `(1 - warn_margin)` of its limit, or
//!    noise / gravity deviation over their limits.
//! 3. **Pass**.

pub mod stats;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::QaConfig;
use crate::measurement::sample::norm;
use crate::measurement::Sample;
use stats::{LinearFit, RunningStats};

/// Outcome of one device's QA pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// All metrics comfortably inside limits
    Pass,
    /// Inside hard limits but close to one, or a soft metric out of range
    Warn,
    /// No data, or a hard limit exceeded
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Warn => write!(f, "WARN"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// Per-device result of a QA pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResult {
    /// Device identity
    pub device_id: String,
    /// Overall verdict
    pub verdict: Verdict,
    /// Mean angular change per gyro interval (degrees)
    pub mac_deg: f64,
    /// Gyro noise, root-sum-square of per-axis σ (°/s)
    pub noise_sigma: f64,
    /// Orientation drift (degrees per minute)
    pub drift_deg_per_min: f64,
    /// Mean acceleration magnitude (g), 0.0 without accelerometer data
    pub gravity_mean_g: f64,
    /// Abnormal gyro samples in the window
    pub abnormal_count: u32,
    /// Samples evaluated
    pub sample_count: usize,
}

impl QaResult {
    /// The all-zero Fail result for a device that produced no data.
    pub fn no_data(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            verdict: Verdict::Fail,
            mac_deg: 0.0,
            noise_sigma: 0.0,
            drift_deg_per_min: 0.0,
            gravity_mean_g: 0.0,
            abnormal_count: 0,
            sample_count: 0,
        }
    }
}

impl fmt::Display for QaResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}  mac={:.4}°  noise={:.4}°/s  drift={:.4}°/min  gravity={:.4}g  abnormal={}  samples={}",
            self.device_id,
            self.verdict,
            self.mac_deg,
            self.noise_sigma,
            self.drift_deg_per_min,
            self.gravity_mean_g,
            self.abnormal_count,
            self.sample_count
        )
    }
}

/// Gyro-derived metrics of one log.
#[derive(Debug, Default)]
struct GyroMetrics {
    mac_deg: f64,
    noise_sigma: f64,
    drift_deg_per_min: f64,
    abnormal_count: u32,
}

fn gyro_metrics<'a>(gyro: impl Iterator<Item = &'a Sample>, config: &QaConfig) -> GyroMetrics {
    let mut axis_stats = [RunningStats::new(); 3];
    let mut drift_fit = [LinearFit::new(); 3];
    let mut change = RunningStats::new();
    let mut angle = [0.0_f64; 3];
    let mut abnormal = 0_u32;
    let mut previous: Option<&Sample> = None;
    let mut t0 = 0.0;

    for sample in gyro {
        let rate = sample.gyro_dps;
        for (stats, &w) in axis_stats.iter_mut().zip(rate.iter()) {
            stats.add(w);
        }

        let mut step_deg = 0.0;
        match previous {
            None => t0 = sample.timestamp_s,
            Some(prev) => {
                let dt = sample.timestamp_s - prev.timestamp_s;
                let step = if dt > 0.0 {
                    [0, 1, 2].map(|i| 0.5 * (prev.gyro_dps[i] + rate[i]) * dt)
                } else {
                    [0.0; 3]
                };
                for (a, d) in angle.iter_mut().zip(step) {
                    *a += d;
                }
                step_deg = norm(step);
                change.add(step_deg);
            }
        }

        let elapsed = sample.timestamp_s - t0;
        for (fit, &a) in drift_fit.iter_mut().zip(angle.iter()) {
            fit.add(elapsed, a);
        }

        if sample.gyro_magnitude() > config.gyro_stillness_deg_per_s
            || step_deg > config.abnormal_threshold_deg
        {
            abnormal = abnormal.saturating_add(1);
        }
        previous = Some(sample);
    }

    GyroMetrics {
        mac_deg: change.mean(),
        noise_sigma: norm(axis_stats.map(|s| s.std())),
        drift_deg_per_min: norm(drift_fit.map(|f| f.slope())) * 60.0,
        abnormal_count: abnormal,
    }
}

/// Evaluate one device's measurement-window samples.
///
/// Samples must be in arrival order. An empty log is a Fail with every
/// metric at zero.
pub fn evaluate(device_id: &str, samples: &[Sample], config: &QaConfig) -> QaResult {
    if samples.is_empty() {
        return QaResult::no_data(device_id);
    }

    let mut gravity = RunningStats::new();
    for sample in samples.iter().filter(|s| s.has_accel()) {
        gravity.add(sample.accel_magnitude());
    }
    let gyro = gyro_metrics(samples.iter().filter(|s| s.has_gyro()), config);

    let mut result = QaResult {
        device_id: device_id.to_string(),
        verdict: Verdict::Pass,
        mac_deg: gyro.mac_deg,
        noise_sigma: gyro.noise_sigma,
        drift_deg_per_min: gyro.drift_deg_per_min,
        gravity_mean_g: gravity.mean(),
        abnormal_count: gyro.abnormal_count,
        sample_count: samples.len(),
    };
    let gravity_deviation = (gravity.count() > 0).then(|| (result.gravity_mean_g - 1.0).abs());
    result.verdict = verdict(&result, gravity_deviation, config);
    result
}

fn verdict(result: &QaResult, gravity_deviation: Option<f64>, config: &QaConfig) -> Verdict {
    let abnormal = f64::from(result.abnormal_count);
    let budget = f64::from(config.max_abnormal_per_window);

    if abnormal > budget
        || result.mac_deg > config.max_mac_deg
        || result.drift_deg_per_min > config.max_drift_deg_per_min
    {
        return Verdict::Fail;
    }

    let near = |value: f64, limit: f64| value > 0.0 && value >= (1.0 - config.warn_margin) * limit;
    let gravity_flag = gravity_deviation.is_some_and(|dev| {
        dev > config.gravity_deviation_g || near(dev, config.gravity_deviation_g)
    });

    if near(abnormal, budget)
        || near(result.mac_deg, config.max_mac_deg)
        || near(result.drift_deg_per_min, config.max_drift_deg_per_min)
        || near(result.noise_sigma, config.max_noise_sigma_deg)
        || result.noise_sigma > config.max_noise_sigma_deg
        || gravity_flag
    {
        Verdict::Warn
    } else {
        Verdict::Pass
    }
}
