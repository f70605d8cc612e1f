//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for a QA run.
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (the values the production fixtures were tuned with)
//! 2. `config/imu_qa.toml` (or an explicit path)
//! 3. Environment variables prefixed with `IMU_QA_`, `__` separating sections
//!
//! Durations are written in humantime notation (`"5s"`, `"100ms"`).
//!
//! # Example
//! ```no_run
//! use imu_qa::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! println!("Measuring for {:?}", config.qa.measurement);
//! # Ok::<(), imu_qa::error::QaError>(())
//! ```
//!
//! ```toml
//! [qa]
//! settle = "5s"
//! measurement = "60s"
//! max_drift_deg_per_min = 0.10
//!
//! [discovery]
//! addresses = ["C6:22:D5:9E:0C:53", "D8:6C:8A:A8:38:DE"]
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AppResult, QaError};
use crate::validation::{is_in_range, is_nonzero_duration, is_not_empty, is_valid_threshold};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/imu_qa.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "IMU_QA_";

/// Upper bound on simultaneously tested units.
pub const MAX_DEVICES_LIMIT: usize = 10;

/// Longest poll interval that still keeps per-device buffers small.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Timing and thresholds of a QA pass
    pub qa: QaConfig,
    /// Per-device session settings
    pub session: SessionConfig,
    /// Discovery and connection bring-up
    pub discovery: DiscoveryConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, colored
    #[default]
    Pretty,
    /// Single line, no colors
    Compact,
    /// One JSON object per event
    Json,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "IMU QA".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Timing protocol and evaluation thresholds of one QA pass.
///
/// Immutable once handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Time allowed for sensor output to stabilise before measuring.
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
    /// Length of the evaluated measurement window.
    #[serde(with = "humantime_serde")]
    pub measurement: Duration,
    /// Drain cadence of each device's buffer during the window.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Cadence of per-device progress log lines.
    #[serde(with = "humantime_serde")]
    pub progress_interval: Duration,

    /// Per-sample angular change above which a sample is abnormal (degrees).
    pub abnormal_threshold_deg: f64,
    /// Allowed deviation of mean gravity magnitude from 1 g.
    pub gravity_deviation_g: f64,
    /// Angular rate above which a sample is abnormal (°/s).
    pub gyro_stillness_deg_per_s: f64,
    /// Abnormal samples tolerated in one measurement window.
    pub max_abnormal_per_window: u32,
    /// Largest acceptable mean angular change (degrees).
    pub max_mac_deg: f64,
    /// Largest acceptable gyro noise σ.
    pub max_noise_sigma_deg: f64,
    /// Largest acceptable orientation drift (degrees per minute).
    pub max_drift_deg_per_min: f64,
    /// Fraction below a threshold at which a metric starts to warn.
    pub warn_margin: f64,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            measurement: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
            progress_interval: Duration::from_secs(2),
            abnormal_threshold_deg: 0.30,
            gravity_deviation_g: 0.05,
            gyro_stillness_deg_per_s: 0.5,
            max_abnormal_per_window: 100,
            max_mac_deg: 0.20,
            max_noise_sigma_deg: 0.05,
            max_drift_deg_per_min: 0.10,
            warn_margin: 0.2,
        }
    }
}

/// Device session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause between the accelerometer and gyroscope enable commands.
    #[serde(with = "humantime_serde")]
    pub enable_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enable_delay: Duration::from_millis(100),
        }
    }
}

/// Discovery and connection bring-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Substring an advertised name must contain (used when `addresses` is empty).
    pub name_filter: String,
    /// Explicit address allow-list, compared case-insensitively.
    pub addresses: Vec<String>,
    /// Fewest units worth running a pass with.
    pub min_devices: usize,
    /// Most units connected at once.
    pub max_devices: usize,
    /// Scan attempts before giving up.
    pub max_scan_attempts: u32,
    /// Length of each scan.
    #[serde(with = "humantime_serde")]
    pub scan_duration: Duration,
    /// Pause between scan attempts.
    #[serde(with = "humantime_serde")]
    pub rescan_delay: Duration,
    /// Pause between starting consecutive sessions.
    #[serde(with = "humantime_serde")]
    pub connect_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            name_filter: "GMSync".to_string(),
            addresses: Vec::new(),
            min_devices: 2,
            max_devices: MAX_DEVICES_LIMIT,
            max_scan_attempts: 5,
            scan_duration: Duration::from_secs(10),
            rescan_delay: Duration::from_secs(2),
            connect_delay: Duration::from_millis(500),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// A missing file is not an error; defaults and environment still apply.
    /// Example override: `IMU_QA_QA__MEASUREMENT=30s`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The provider stack used by [`AppConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(QaError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.qa.validate()?;
        self.discovery.validate()
    }
}

fn invalid(field: &str, reason: &str) -> QaError {
    QaError::Configuration(format!("{field}: {reason}"))
}

impl QaConfig {
    /// Check timing and thresholds.
    pub fn validate(&self) -> AppResult<()> {
        is_nonzero_duration(self.measurement).map_err(|e| invalid("qa.measurement", e))?;
        is_nonzero_duration(self.poll_interval).map_err(|e| invalid("qa.poll_interval", e))?;
        if self.poll_interval > MAX_POLL_INTERVAL {
            return Err(invalid(
                "qa.poll_interval",
                "must not exceed 50ms or device buffers grow unchecked",
            ));
        }
        is_nonzero_duration(self.progress_interval)
            .map_err(|e| invalid("qa.progress_interval", e))?;

        for (field, value) in [
            ("qa.abnormal_threshold_deg", self.abnormal_threshold_deg),
            ("qa.gravity_deviation_g", self.gravity_deviation_g),
            ("qa.gyro_stillness_deg_per_s", self.gyro_stillness_deg_per_s),
            ("qa.max_mac_deg", self.max_mac_deg),
            ("qa.max_noise_sigma_deg", self.max_noise_sigma_deg),
            ("qa.max_drift_deg_per_min", self.max_drift_deg_per_min),
        ] {
            is_valid_threshold(value).map_err(|e| invalid(field, e))?;
        }

        if !(0.0..1.0).contains(&self.warn_margin) {
            return Err(invalid("qa.warn_margin", "must be in [0, 1)"));
        }
        Ok(())
    }
}

impl DiscoveryConfig {
    /// Check device counts and filters.
    pub fn validate(&self) -> AppResult<()> {
        is_in_range(self.max_devices, 1..=MAX_DEVICES_LIMIT)
            .map_err(|e| invalid("discovery.max_devices", e))?;
        if self.min_devices > self.max_devices {
            return Err(invalid(
                "discovery.min_devices",
                "cannot exceed discovery.max_devices",
            ));
        }
        if self.max_scan_attempts == 0 {
            return Err(invalid("discovery.max_scan_attempts", "must be at least 1"));
        }
        if self.addresses.is_empty() {
            is_not_empty(&self.name_filter).map_err(|e| invalid("discovery.name_filter", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.qa.settle, Duration::from_secs(5));
        assert_eq!(config.qa.measurement, Duration::from_secs(60));
        assert_eq!(config.qa.max_abnormal_per_window, 100);
        assert_eq!(config.discovery.name_filter, "GMSync");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(QaError::Configuration(msg)) if msg.contains("loud")
        ));
    }

    #[test]
    fn test_poll_interval_bounds() {
        let mut qa = QaConfig::default();
        qa.poll_interval = Duration::from_millis(51);
        assert!(qa.validate().is_err());
        qa.poll_interval = Duration::ZERO;
        assert!(qa.validate().is_err());
        qa.poll_interval = Duration::from_millis(50);
        assert!(qa.validate().is_ok());
    }

    #[test]
    fn test_zero_measurement_window_rejected() {
        let qa = QaConfig {
            measurement: Duration::ZERO,
            ..QaConfig::default()
        };
        assert!(qa.validate().is_err());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let qa = QaConfig {
            max_mac_deg: -1.0,
            ..QaConfig::default()
        };
        let err = qa.validate().unwrap_err();
        assert!(err.to_string().contains("qa.max_mac_deg"));
    }

    #[test]
    fn test_warn_margin_range() {
        let mut qa = QaConfig {
            warn_margin: 1.0,
            ..QaConfig::default()
        };
        assert!(qa.validate().is_err());
        qa.warn_margin = 0.0;
        assert!(qa.validate().is_ok());
    }

    #[test]
    fn test_discovery_device_counts() {
        let mut discovery = DiscoveryConfig {
            min_devices: 3,
            max_devices: 2,
            ..DiscoveryConfig::default()
        };
        assert!(discovery.validate().is_err());

        discovery.min_devices = 1;
        discovery.max_devices = 11;
        assert!(discovery.validate().is_err());

        discovery.max_devices = 0;
        discovery.min_devices = 0;
        assert!(discovery.validate().is_err());
    }

    #[test]
    fn test_empty_name_filter_needs_addresses() {
        let mut discovery = DiscoveryConfig {
            name_filter: String::new(),
            ..DiscoveryConfig::default()
        };
        assert!(discovery.validate().is_err());
        discovery.addresses = vec!["C6:22:D5:9E:0C:53".to_string()];
        assert!(discovery.validate().is_ok());
    }
}
