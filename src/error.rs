//! Custom error types for the application.
//!
//! This module defines the error types used across the QA pipeline. Using the
//! `thiserror` crate, it provides a consistent way to report the few failures
//! that are actually surfaced to callers.
//!
//! ## Error Hierarchy
//!
//! - **`SessionError`**: Connection-class failures of a single device session
//!   (connect, subscribe, enabling sensors). These are reported once by
//!   `DeviceSession::start` and never abort a run on their own.
//! - **`QaError`**: Run-level failures. The only fatal run condition is
//!   `NoActiveDevices`; the remaining variants cover configuration problems
//!   and discovery shortfalls.
//!
//! Protocol errors (malformed frames) and data errors (empty logs) are not
//! represented here at all: the former are dropped silently and the latter are
//! a first-class `Fail` verdict.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, QaError>;

/// Failure of a device session while starting.
///
/// Every variant carries the transport error message so that the caller can
/// log it alongside the device identity.
#[derive(Error, Debug)]
pub enum SessionError {
    /// `connect()` on the transport failed.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// `connect()` returned success but the link reports as down.
    #[error("Not connected after connect()")]
    NotConnected,

    /// Subscribing to the notification characteristic failed.
    #[error("Notification subscribe failed: {0}")]
    Subscribe(String),

    /// Writing one of the sensor enable commands failed.
    #[error("Failed to enable sensors: {0}")]
    EnableSensors(String),

    /// `start()` was called on a session that is not idle.
    #[error("Session cannot start from state '{0}'")]
    InvalidState(String),
}

/// Primary error type for a QA run.
#[derive(Error, Debug)]
pub enum QaError {
    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// No device reached the active set, so there is nothing to evaluate.
    #[error("No device sessions started")]
    NoActiveDevices,

    /// Discovery gave up before finding the minimum number of devices.
    #[error("Found {found} device(s) after {attempts} scan attempt(s), need at least {required}")]
    InsufficientDevices {
        /// Devices matched across all attempts.
        found: usize,
        /// Configured minimum.
        required: usize,
        /// Scan attempts performed.
        attempts: u32,
    },

    /// A scanner call failed outright.
    #[error("Discovery error: {0}")]
    Discovery(String),
}

impl From<figment::Error> for QaError {
    fn from(err: figment::Error) -> Self {
        QaError::Config(Box::new(err))
    }
}
