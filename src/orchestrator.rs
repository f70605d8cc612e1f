//! Acquisition Orchestrator
//!
//! Runs one QA pass across a fixed set of started [`DeviceSession`]s:
//!
//! 1. Wait out the settle window, then drain what arrived during it into the
//!    device's settle log.
//! 2. For the measurement window, drain every session on its own tokio task
//!    at `poll_interval`, logging progress every `progress_interval`.
//! 3. At window end (or on abort) stop all sessions concurrently and keep
//!    whatever was still buffered as the device's trailing log.
//! 4. Evaluate each device's measurement samples, in registration order.
//!
//! A device that produced nothing still gets a result (Fail, zero metrics).

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AppConfig, QaConfig};
use crate::error::{AppResult, QaError};
use crate::evaluation::{evaluate, QaResult};
use crate::hardware::Advertisement;
use crate::measurement::Sample;
use crate::session::DeviceSession;

/// Everything collected from one device during a pass
#[derive(Debug, Clone)]
pub struct DeviceLog {
    /// Device identity
    pub device_id: String,
    /// Samples received during the settle window, not evaluated
    pub settle: Vec<Sample>,
    /// Measurement-window samples in arrival order
    pub samples: Vec<Sample>,
    /// Samples still buffered when the sessions were stopped, not evaluated
    pub trailing: Vec<Sample>,
}

impl DeviceLog {
    /// Every sample received from the device, in arrival order.
    pub fn all_samples(&self) -> impl Iterator<Item = &Sample> {
        self.settle.iter().chain(&self.samples).chain(&self.trailing)
    }
}

/// Cloneable handle that ends a running pass early.
///
/// Aborting stops acquisition at the next poll tick; the partial logs are
/// still evaluated.
///
/// The flag is never cleared. Once aborted, any later [`QaOrchestrator::run`]
/// on the same orchestrator skips both windows and evaluates empty logs, so a
/// fresh pass needs a fresh orchestrator.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Request an early stop.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Whether an abort was requested.
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Start one session per candidate, sequentially.
///
/// Starts are spaced by `discovery.connect_delay`. Failed starts are logged
/// and left out; an empty result is [`QaError::NoActiveDevices`].
pub async fn connect_all(
    candidates: Vec<Advertisement>,
    config: &AppConfig,
) -> AppResult<Vec<Arc<DeviceSession>>> {
    let total = candidates.len();
    let mut active = Vec::with_capacity(total);

    for (index, candidate) in candidates.into_iter().enumerate() {
        if index > 0 {
            sleep(config.discovery.connect_delay).await;
        }
        let id = candidate.transport.address();
        info!(device = %id, name = %candidate.name, "Connecting");
        let session = DeviceSession::new(id, candidate.transport, &config.session);
        match session.start().await {
            Ok(()) => active.push(Arc::new(session)),
            Err(e) => error!(device = %session.id(), error = %e, "Excluding device"),
        }
    }

    info!(active = active.len(), total, "Connection bring-up complete");
    if active.is_empty() {
        return Err(QaError::NoActiveDevices);
    }
    Ok(active)
}

/// Coordinates the timing protocol of one QA pass.
pub struct QaOrchestrator {
    config: QaConfig,
    sessions: Vec<Arc<DeviceSession>>,
    abort_tx: Arc<watch::Sender<bool>>,
}

impl QaOrchestrator {
    /// Orchestrator over already-started sessions.
    pub fn new(config: QaConfig, sessions: Vec<Arc<DeviceSession>>) -> Self {
        let (abort_tx, _) = watch::channel(false);
        Self {
            config,
            sessions,
            abort_tx: Arc::new(abort_tx),
        }
    }

    /// Handle for stopping the pass from elsewhere (e.g. a Ctrl-C handler).
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: Arc::clone(&self.abort_tx),
        }
    }

    /// Registered sessions, in registration order.
    pub fn sessions(&self) -> &[Arc<DeviceSession>] {
        &self.sessions
    }

    /// Run the full pass and evaluate every device.
    ///
    /// Sessions are stopped on return; a second call yields empty logs.
    #[instrument(skip(self), fields(devices = self.sessions.len()))]
    pub async fn run(&self) -> AppResult<Vec<QaResult>> {
        if self.sessions.is_empty() {
            return Err(QaError::NoActiveDevices);
        }

        let logs = self.acquire().await;
        let results: Vec<QaResult> = logs
            .iter()
            .map(|log| evaluate(&log.device_id, &log.samples, &self.config))
            .collect();

        for (log, result) in logs.iter().zip(&results) {
            info!(
                device = %result.device_id,
                verdict = %result.verdict,
                samples = log.samples.len(),
                settle_samples = log.settle.len(),
                trailing_samples = log.trailing.len(),
                mac_deg = result.mac_deg,
                noise_sigma = result.noise_sigma,
                drift_deg_per_min = result.drift_deg_per_min,
                gravity_mean_g = result.gravity_mean_g,
                abnormal = result.abnormal_count,
                "Device evaluated"
            );
            for sample in log.samples.iter().take(3) {
                debug!(device = %log.device_id, ?sample, "First readings");
            }
        }
        Ok(results)
    }

    /// Settle, measure and stop, returning the raw per-device logs.
    pub async fn acquire(&self) -> Vec<DeviceLog> {
        let mut abort_rx = self.abort_tx.subscribe();
        let settle_end = Instant::now() + self.config.settle;

        info!(settle = ?self.config.settle, "Settling");
        let settled = wait_until(settle_end, &mut abort_rx).await;
        let settle_logs: Vec<Vec<Sample>> =
            self.sessions.iter().map(|s| s.drain_samples()).collect();

        let collected = if settled {
            let deadline = settle_end + self.config.measurement;
            info!(measurement = ?self.config.measurement, "Measuring");
            self.measure(deadline, &abort_rx).await
        } else {
            warn!("Aborted during settle window");
            vec![Vec::new(); self.sessions.len()]
        };

        join_all(self.sessions.iter().map(|s| s.stop())).await;

        self.sessions
            .iter()
            .zip(settle_logs)
            .zip(collected)
            .map(|((session, settle), samples)| {
                let trailing = session.drain_samples();
                if !trailing.is_empty() {
                    debug!(
                        device = %session.id(),
                        trailing = trailing.len(),
                        "Samples received after window end"
                    );
                }
                DeviceLog {
                    device_id: session.id().to_string(),
                    settle,
                    samples,
                    trailing,
                }
            })
            .collect()
    }

    async fn measure(&self, deadline: Instant, abort_rx: &watch::Receiver<bool>) -> Vec<Vec<Sample>> {
        let tasks: Vec<_> = self
            .sessions
            .iter()
            .map(|session| {
                tokio::spawn(drain_loop(
                    Arc::clone(session),
                    deadline,
                    self.config.poll_interval,
                    self.config.progress_interval,
                    abort_rx.clone(),
                ))
            })
            .collect();

        let mut logs = Vec::with_capacity(tasks.len());
        for (session, joined) in self.sessions.iter().zip(join_all(tasks).await) {
            match joined {
                Ok(samples) => logs.push(samples),
                Err(e) => {
                    error!(device = %session.id(), error = %e, "Drain task failed");
                    logs.push(Vec::new());
                }
            }
        }
        logs
    }
}

/// Sleep until `deadline`; false if aborted first.
async fn wait_until(deadline: Instant, abort_rx: &mut watch::Receiver<bool>) -> bool {
    if *abort_rx.borrow() {
        return false;
    }
    tokio::select! {
        _ = sleep_until(deadline) => true,
        aborted = async { abort_rx.wait_for(|flag| *flag).await.is_ok() } => {
            // A closed channel can no longer abort; finish the wait.
            if aborted {
                false
            } else {
                sleep_until(deadline).await;
                true
            }
        }
    }
}

async fn drain_loop(
    session: Arc<DeviceSession>,
    deadline: Instant,
    poll_interval: Duration,
    progress_interval: Duration,
    abort_rx: watch::Receiver<bool>,
) -> Vec<Sample> {
    let mut log = Vec::new();
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let window_end = sleep_until(deadline);
    tokio::pin!(window_end);
    let mut next_progress = Instant::now() + progress_interval;

    loop {
        tokio::select! {
            _ = &mut window_end => break,
            _ = ticker.tick() => {}
        }
        log.extend(session.drain_samples());

        if *abort_rx.borrow() {
            info!(device = %session.id(), samples = log.len(), "Measurement aborted");
            break;
        }
        if Instant::now() >= next_progress {
            info!(device = %session.id(), samples = log.len(), "Collecting");
            next_progress += progress_interval;
        }
    }

    log.extend(session.drain_samples());
    log
}
