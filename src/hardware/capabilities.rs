//! Wireless Transport Capabilities
//!
//! The QA core never talks to a concrete BLE binding. Instead it consumes two
//! small capability traits that a platform backend implements:
//!
//! - [`Transport`]: one connection to one unit (connect, subscribe, write)
//! - [`Scanner`]: advertisement discovery yielding transports
//!
//! Platform bindings differ wildly (WinRT on Windows, BlueZ on Linux, ...),
//! so each backend lives behind these traits and is selected at build or
//! configuration time. The crate ships the simulated backend in
//! [`crate::hardware::mock`].
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Takes `&self`; backends use interior mutability for connection state
//!
//! # Example
//!
//! ```rust,ignore
//! async fn enable_accel<T: Transport + ?Sized>(link: &T) -> Result<()> {
//!     link.connect().await?;
//!     let frame = encode_command(Command::EnableAccel.code(), &[]);
//!     link.write(IMU_SERVICE, WRITE_CHARACTERISTIC, &frame).await
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Callback invoked by a transport for every notification payload.
///
/// Runs on the transport's own delivery context, which may be a foreign
/// thread. Implementations must be quick and must not block.
pub type NotificationCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Capability: Connection to one wireless unit
///
/// # Contract
/// - `connect` establishes the link; it may succeed while the link still
///   reports down, so callers check `is_connected` afterwards
/// - `subscribe` registers a callback that the transport invokes for every
///   notification on the characteristic until `unsubscribe`
/// - `write` performs a write-with-response of a complete frame
/// - Any call may fail; callers decide whether the failure is fatal
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable identity of the unit (address or serial).
    fn address(&self) -> String;

    /// Establish the link.
    async fn connect(&self) -> Result<()>;

    /// Tear the link down.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the link is currently up.
    async fn is_connected(&self) -> bool;

    /// Start delivering notifications of `characteristic` to `callback`.
    async fn subscribe(
        &self,
        service: Uuid,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> Result<()>;

    /// Stop delivering notifications of `characteristic`.
    async fn unsubscribe(&self, service: Uuid, characteristic: Uuid) -> Result<()>;

    /// Write `data` to `characteristic`.
    async fn write(&self, service: Uuid, characteristic: Uuid, data: &[u8]) -> Result<()>;
}

/// A unit seen during a scan.
#[derive(Clone)]
pub struct Advertisement {
    /// Advertised local name (may be empty).
    pub name: String,
    /// Address as reported by the adapter.
    pub address: String,
    /// Handle used to connect to this unit.
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Advertisement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advertisement")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Capability: Advertisement discovery
///
/// # Contract
/// - `scan_for` listens for `duration` and returns every unit seen, possibly
///   with duplicates; filtering is the caller's job
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan for `duration` and return what was heard.
    async fn scan_for(&self, duration: Duration) -> Result<Vec<Advertisement>>;
}
