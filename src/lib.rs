//! # IMU QA Core Library
//!
//! This crate acquires motion data from several wireless IMU units at once and
//! grades each unit's stability (orientation change, noise, drift, gravity
//! sanity) into a PASS / WARN / FAIL verdict. The `imu-qa` binary is a thin
//! command-line shell over it.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: Frame layout, command codes, characteristic UUIDs and the
//!   byte-level codec that turns notifications into scaled readings.
//! - **`measurement`**: The `Sample` data model, the monotonic host clock and
//!   the lock-guarded `SampleBuffer` shared between notification and drain paths.
//! - **`hardware`**: `Transport` and `Scanner` capability traits plus the mock
//!   and simulated implementations used by tests and `--simulate` runs.
//! - **`session`**: `DeviceSession`, the connect/subscribe/enable lifecycle of
//!   one unit.
//! - **`orchestrator`**: Settle/measurement timing across all sessions with
//!   per-device drain tasks, and connection bring-up.
//! - **`evaluation`**: Pure metrics and verdict computation over a sample log.
//! - **`discovery`**: Repeated scan-with-timeout over a `Scanner`.
//! - **`config`**: Layered configuration (defaults, TOML, environment).
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: `SessionError` and `QaError`.
//! - **`validation`**: Small validators used by configuration checks.

pub mod config;
pub mod discovery;
pub mod error;
pub mod evaluation;
pub mod hardware;
pub mod logging;
pub mod measurement;
pub mod orchestrator;
pub mod protocol;
pub mod session;
pub mod validation;

pub use evaluation::{evaluate, QaResult, Verdict};
pub use measurement::Sample;
pub use orchestrator::{connect_all, AbortHandle, DeviceLog, QaOrchestrator};
pub use session::{DeviceSession, SessionState};
