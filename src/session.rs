//! Device session management.
//!
//! A [`DeviceSession`] owns the link to one unit and turns its notification
//! stream into a running buffer of [`Sample`]s.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌──────┐ start() ┌──────────┐   ok   ┌─────────┐ stop() ┌──────────┐     ┌─────────┐
//! │ Idle │────────▶│ Starting │───────▶│ Running │───────▶│ Stopping │────▶│ Stopped │
//! └──────┘         └────┬─────┘        └─────────┘        └──────────┘     └─────────┘
//!    ▲                  │ connect / subscribe / enable failed
//!    └──────────────────┘
//! ```
//!
//! - **Starting**: connect, subscribe to the notification characteristic with
//!   the session's decode-and-buffer callback, then enable the accelerometer
//!   and gyroscope with a short pause in between.
//! - **Running**: the transport's callback appends samples; the orchestrator
//!   drains them with [`DeviceSession::drain_samples`].
//! - **Stopping**: stop-all, unsubscribe, disconnect. Each step is attempted
//!   even if an earlier one failed; failures are logged and swallowed.
//!
//! Nothing is retried here. A failed start is reported once and the caller
//! decides what to do with the unit.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::hardware::{NotificationCallback, Transport};
use crate::measurement::{host_time_s, Sample, SampleBuffer};
use crate::protocol::codec::{decode_notification, encode_command, scale_reading};
use crate::protocol::{Command, IMU_SERVICE, NOTIFY_CHARACTERISTIC, WRITE_CHARACTERISTIC};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, or a start attempt failed
    Idle,
    /// Bringing the link up
    Starting,
    /// Streaming into the buffer
    Running,
    /// Tearing the link down
    Stopping,
    /// Torn down; terminal
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Running => write!(f, "running"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Decode one notification and append the resulting sample.
///
/// The timestamp is taken on receipt, before decoding. Returns false when the
/// frame was rejected (bad header, unknown telemetry type).
pub fn ingest_notification(buffer: &SampleBuffer, bytes: &[u8]) -> bool {
    let timestamp_s = host_time_s();
    match decode_notification(bytes).as_ref().and_then(scale_reading) {
        Some(reading) => {
            buffer.push(Sample::from_reading(timestamp_s, reading));
            true
        }
        None => false,
    }
}

/// Connection and acquisition lifecycle for one unit.
///
/// # Example
///
/// ```
/// use imu_qa::config::SessionConfig;
/// use imu_qa::hardware::mock::MockTransport;
/// use imu_qa::DeviceSession;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let link = Arc::new(MockTransport::new("C6:22:D5:9E:0C:53"));
/// let session = DeviceSession::new("C6:22:D5:9E:0C:53", link, &SessionConfig::default());
///
/// session.start().await.unwrap();
/// assert!(session.is_running());
/// session.stop().await;
/// assert!(session.drain_samples().is_empty());
/// # });
/// ```
pub struct DeviceSession {
    id: String,
    transport: Arc<dyn Transport>,
    buffer: Arc<SampleBuffer>,
    state: Mutex<SessionState>,
    rejected_frames: Arc<AtomicU64>,
    enable_delay: Duration,
}

impl DeviceSession {
    /// Create an idle session over `transport`.
    pub fn new(id: impl Into<String>, transport: Arc<dyn Transport>, config: &SessionConfig) -> Self {
        Self {
            id: id.into(),
            transport,
            buffer: Arc::new(SampleBuffer::new()),
            state: Mutex::new(SessionState::Idle),
            rejected_frames: Arc::new(AtomicU64::new(0)),
            enable_delay: config.enable_delay,
        }
    }

    /// Device identity (address or serial).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the session is streaming.
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Frames dropped by the decoder so far.
    pub fn rejected_frames(&self) -> u64 {
        self.rejected_frames.load(Ordering::Relaxed)
    }

    /// Samples waiting to be drained.
    pub fn backlog(&self) -> usize {
        self.buffer.len()
    }

    /// Bring the link up and start streaming.
    ///
    /// On failure the session is back in `Idle` and any partially established
    /// link has been torn down best-effort.
    #[instrument(skip(self), fields(device = %self.id), err)]
    pub async fn start(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Idle {
                return Err(SessionError::InvalidState((*state).to_string()));
            }
            *state = SessionState::Starting;
        }

        match self.bring_up().await {
            Ok(()) => {
                *self.state.lock() = SessionState::Running;
                info!(device = %self.id, "Session started (accel + gyro enabled)");
                Ok(())
            }
            Err(err) => {
                self.abandon_start(&err).await;
                *self.state.lock() = SessionState::Idle;
                Err(err)
            }
        }
    }

    async fn bring_up(&self) -> Result<(), SessionError> {
        self.transport
            .connect()
            .await
            .map_err(|e| SessionError::Connect(format!("{e:#}")))?;
        if !self.transport.is_connected().await {
            return Err(SessionError::NotConnected);
        }

        self.transport
            .subscribe(IMU_SERVICE, NOTIFY_CHARACTERISTIC, self.notification_callback())
            .await
            .map_err(|e| SessionError::Subscribe(format!("{e:#}")))?;

        self.send(Command::EnableAccel)
            .await
            .map_err(|e| SessionError::EnableSensors(format!("{e:#}")))?;
        // The units drop commands that arrive back to back.
        sleep(self.enable_delay).await;
        self.send(Command::EnableGyro)
            .await
            .map_err(|e| SessionError::EnableSensors(format!("{e:#}")))?;
        Ok(())
    }

    async fn abandon_start(&self, err: &SessionError) {
        match err {
            SessionError::Connect(_) | SessionError::InvalidState(_) => {}
            SessionError::NotConnected | SessionError::Subscribe(_) => {
                self.disconnect_quietly().await;
            }
            SessionError::EnableSensors(_) => {
                if let Err(e) = self
                    .transport
                    .unsubscribe(IMU_SERVICE, NOTIFY_CHARACTERISTIC)
                    .await
                {
                    debug!(device = %self.id, error = %e, "Unsubscribe after failed start");
                }
                self.disconnect_quietly().await;
            }
        }
    }

    async fn disconnect_quietly(&self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!(device = %self.id, error = %e, "Disconnect after failed start");
        }
    }

    /// Stop streaming and release the link.
    ///
    /// Idempotent and best-effort: only the first call on a running session
    /// does anything, and each teardown step runs regardless of earlier
    /// failures. Safe to call in any state.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Running {
                return;
            }
            *state = SessionState::Stopping;
        }
        info!(device = %self.id, "Stopping session");

        if let Err(e) = self.send(Command::StopAll).await {
            warn!(device = %self.id, error = %e, "Stop-all command failed");
        }
        if let Err(e) = self
            .transport
            .unsubscribe(IMU_SERVICE, NOTIFY_CHARACTERISTIC)
            .await
        {
            warn!(device = %self.id, error = %e, "Unsubscribe failed");
        }
        if self.transport.is_connected().await {
            if let Err(e) = self.transport.disconnect().await {
                warn!(device = %self.id, error = %e, "Disconnect failed");
            }
        }

        *self.state.lock() = SessionState::Stopped;
        info!(
            device = %self.id,
            rejected_frames = self.rejected_frames(),
            "Session stopped"
        );
    }

    /// Remove and return every sample received since the last drain.
    ///
    /// Never blocks beyond the buffer swap. On a session that never started
    /// this is simply empty.
    pub fn drain_samples(&self) -> Vec<Sample> {
        self.buffer.drain()
    }

    async fn send(&self, command: Command) -> anyhow::Result<()> {
        let frame = encode_command(command.code(), &[]);
        debug!(device = %self.id, %command, "Sending command");
        self.transport
            .write(IMU_SERVICE, WRITE_CHARACTERISTIC, &frame)
            .await
    }

    fn notification_callback(&self) -> NotificationCallback {
        let buffer = Arc::clone(&self.buffer);
        let rejected = Arc::clone(&self.rejected_frames);
        Arc::new(move |bytes: &[u8]| {
            if !ingest_notification(&buffer, bytes) {
                rejected.fetch_add(1, Ordering::Relaxed);
            }
        })
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("backlog", &self.backlog())
            .finish_non_exhaustive()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        // stop() is async and cannot run here.
        if *self.state.get_mut() == SessionState::Running {
            warn!(device = %self.id, "Session dropped while running; link left open");
        }
    }
}
