//! Mock Hardware Implementations
//!
//! Provides simulated transports for testing without physical units.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockTransport` - Scripted link: records every call, lets tests inject
//!   notification bytes and fail individual operations
//! - `SimulatedImu` - Free-running unit that streams framed accelerometer and
//!   gyroscope telemetry once enabled, with configurable bias and noise
//! - `SimulatedScanner` - Scanner over a fixed fleet of advertisements
//!
//! # Performance Characteristics
//!
//! - SimulatedImu: 100 Hz per sensor by default, one accelerometer and one
//!   gyroscope frame per tick

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use uuid::Uuid;

use crate::hardware::capabilities::{Advertisement, NotificationCallback, Scanner, Transport};
use crate::protocol::codec::encode_notification;
use crate::protocol::{
    Command, ACCEL_FULL_SCALE_G, ACCEL_RAW_DIVISOR, GYRO_FULL_SCALE_DPS, GYRO_RAW_DIVISOR,
    NOTIFY_CHARACTERISTIC, WRITE_CHARACTERISTIC,
};

// =============================================================================
// MockTransport - Scripted Link
// =============================================================================

/// Operations a [`MockTransport`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFailure {
    /// `connect()` returns an error.
    Connect,
    /// `connect()` succeeds but `is_connected()` stays false.
    StayDisconnected,
    /// `subscribe()` returns an error.
    Subscribe,
    /// Every `write()` returns an error.
    Write,
    /// `unsubscribe()` returns an error.
    Unsubscribe,
    /// `disconnect()` returns an error.
    Disconnect,
}

/// Scripted transport with full call recording.
///
/// # Example
///
/// ```rust,ignore
/// let link = MockTransport::new("AA:BB");
/// link.fail_on(MockFailure::Subscribe);
/// assert!(session.start().await.is_err());
/// assert_eq!(link.calls(), vec!["connect", "is_connected", "subscribe"]);
/// ```
pub struct MockTransport {
    address: String,
    connected: AtomicBool,
    callback: Mutex<Option<NotificationCallback>>,
    writes: Mutex<Vec<Vec<u8>>>,
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<Vec<MockFailure>>,
}

impl MockTransport {
    /// Create a healthy mock link.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connected: AtomicBool::new(false),
            callback: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Make `op` fail from now on.
    pub fn fail_on(&self, op: MockFailure) {
        self.failures.lock().push(op);
    }

    /// Deliver `bytes` to the subscribed callback, as the link would.
    ///
    /// Returns false when nothing is subscribed.
    pub fn notify(&self, bytes: &[u8]) -> bool {
        // Clone out so the callback never runs under our lock.
        let callback = self.callback.lock().clone();
        match callback {
            Some(cb) => {
                cb(bytes);
                true
            }
            None => false,
        }
    }

    /// Frames written so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Transport calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Whether a notification callback is registered.
    pub fn is_subscribed(&self) -> bool {
        self.callback.lock().is_some()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    fn fails(&self, op: MockFailure) -> bool {
        self.failures.lock().contains(&op)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn connect(&self) -> Result<()> {
        self.record("connect");
        if self.fails(MockFailure::Connect) {
            bail!("MockTransport {}: connection refused", self.address);
        }
        if !self.fails(MockFailure::StayDisconnected) {
            self.connected.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record("disconnect");
        if self.fails(MockFailure::Disconnect) {
            bail!("MockTransport {}: disconnect failed", self.address);
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.record("is_connected");
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(
        &self,
        _service: Uuid,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> Result<()> {
        self.record("subscribe");
        if self.fails(MockFailure::Subscribe) {
            bail!("MockTransport {}: subscribe rejected", self.address);
        }
        if characteristic != NOTIFY_CHARACTERISTIC {
            bail!("MockTransport {}: {} is not notifiable", self.address, characteristic);
        }
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    async fn unsubscribe(&self, _service: Uuid, _characteristic: Uuid) -> Result<()> {
        self.record("unsubscribe");
        if self.fails(MockFailure::Unsubscribe) {
            bail!("MockTransport {}: unsubscribe failed", self.address);
        }
        *self.callback.lock() = None;
        Ok(())
    }

    async fn write(&self, _service: Uuid, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.record("write");
        if self.fails(MockFailure::Write) {
            bail!("MockTransport {}: write timed out", self.address);
        }
        if characteristic != WRITE_CHARACTERISTIC {
            bail!("MockTransport {}: {} is not writable", self.address, characteristic);
        }
        self.writes.lock().push(data.to_vec());
        Ok(())
    }
}

// =============================================================================
// SimulatedImu - Free-running Unit
// =============================================================================

/// Behaviour of a [`SimulatedImu`].
#[derive(Debug, Clone)]
pub struct ImuProfile {
    /// Frames per second, per sensor.
    pub sample_rate_hz: f64,
    /// Gravity vector the accelerometer reports at rest, in g.
    pub gravity_g: [f64; 3],
    /// Half-width of uniform accelerometer noise, in g.
    pub accel_noise_g: f64,
    /// Constant angular rate added to every gyro frame, in °/s.
    pub gyro_bias_dps: [f64; 3],
    /// Half-width of uniform gyroscope noise, in °/s.
    pub gyro_noise_dps: f64,
    /// Fraction of frames delivered truncated (0.0 - 1.0).
    pub corrupt_ratio: f64,
    /// RNG seed for reproducible streams.
    pub seed: Option<u64>,
}

impl Default for ImuProfile {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100.0,
            gravity_g: [0.0, 0.0, 1.0],
            accel_noise_g: 0.002,
            gyro_bias_dps: [0.0; 3],
            gyro_noise_dps: 0.02,
            corrupt_ratio: 0.0,
            seed: None,
        }
    }
}

impl ImuProfile {
    /// A perfectly still, noiseless unit.
    pub fn quiet() -> Self {
        Self {
            accel_noise_g: 0.0,
            gyro_noise_dps: 0.0,
            ..Self::default()
        }
    }
}

struct StreamState {
    accel_enabled: AtomicBool,
    gyro_enabled: AtomicBool,
    frames_sent: AtomicU64,
}

/// Simulated IMU unit speaking the real frame protocol.
///
/// Streams nothing until subscribed and enabled with the same command frames
/// a physical unit expects; `StopAll` silences it again.
pub struct SimulatedImu {
    address: String,
    profile: ImuProfile,
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    state: Arc<StreamState>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedImu {
    /// Create a simulated unit.
    pub fn new(address: impl Into<String>, profile: ImuProfile) -> Self {
        Self {
            address: address.into(),
            profile,
            connected: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            state: Arc::new(StreamState {
                accel_enabled: AtomicBool::new(false),
                gyro_enabled: AtomicBool::new(false),
                frames_sent: AtomicU64::new(0),
            }),
            stream_task: Mutex::new(None),
        }
    }

    /// Make every future `connect()` fail, like a unit out of range.
    pub fn refuse_connections(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }

    /// Total frames handed to the subscriber (including corrupted ones).
    pub fn frames_sent(&self) -> u64 {
        self.state.frames_sent.load(Ordering::Relaxed)
    }

    fn stop_stream(&self) {
        if let Some(task) = self.stream_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for SimulatedImu {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

fn quantize(value: f64, full_scale: f64, divisor: f64) -> i16 {
    let raw = (value * divisor / full_scale).round();
    raw.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

fn jitter(rng: &mut StdRng, half_width: f64) -> f64 {
    if half_width > 0.0 {
        rng.gen_range(-half_width..=half_width)
    } else {
        0.0
    }
}

async fn stream_frames(profile: ImuProfile, state: Arc<StreamState>, callback: NotificationCallback) {
    let mut rng = match profile.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let period = Duration::from_secs_f64(1.0 / profile.sample_rate_hz.max(1.0));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut frames = Vec::with_capacity(2);
        if state.accel_enabled.load(Ordering::Relaxed) {
            let axes = [0, 1, 2].map(|i| {
                let g = profile.gravity_g[i] + jitter(&mut rng, profile.accel_noise_g);
                quantize(g, ACCEL_FULL_SCALE_G, ACCEL_RAW_DIVISOR)
            });
            frames.push(encode_notification(Command::EnableAccel.code(), axes));
        }
        if state.gyro_enabled.load(Ordering::Relaxed) {
            let axes = [0, 1, 2].map(|i| {
                let w = profile.gyro_bias_dps[i] + jitter(&mut rng, profile.gyro_noise_dps);
                quantize(w, GYRO_FULL_SCALE_DPS, GYRO_RAW_DIVISOR)
            });
            frames.push(encode_notification(Command::EnableGyro.code(), axes));
        }

        for mut frame in frames {
            if profile.corrupt_ratio > 0.0 && rng.gen::<f64>() < profile.corrupt_ratio {
                let cut = rng.gen_range(0..frame.len());
                frame.truncate(cut);
            }
            callback(&frame);
            state.frames_sent.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl Transport for SimulatedImu {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn connect(&self) -> Result<()> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(anyhow!("SimulatedImu {}: out of range", self.address));
        }
        // Link establishment latency.
        sleep(Duration::from_millis(5)).await;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.stop_stream();
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(
        &self,
        _service: Uuid,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            bail!("SimulatedImu {}: not connected", self.address);
        }
        if characteristic != NOTIFY_CHARACTERISTIC {
            bail!("SimulatedImu {}: {} is not notifiable", self.address, characteristic);
        }
        self.stop_stream();
        let task = tokio::spawn(stream_frames(
            self.profile.clone(),
            self.state.clone(),
            callback,
        ));
        *self.stream_task.lock() = Some(task);
        Ok(())
    }

    async fn unsubscribe(&self, _service: Uuid, _characteristic: Uuid) -> Result<()> {
        self.stop_stream();
        Ok(())
    }

    async fn write(&self, _service: Uuid, characteristic: Uuid, data: &[u8]) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            bail!("SimulatedImu {}: not connected", self.address);
        }
        if characteristic != WRITE_CHARACTERISTIC {
            bail!("SimulatedImu {}: {} is not writable", self.address, characteristic);
        }
        // Unknown or malformed commands are ignored, as the firmware does.
        let Some(command) = data.get(2).copied().and_then(Command::from_code) else {
            return Ok(());
        };
        match command {
            Command::EnableAccel => self.state.accel_enabled.store(true, Ordering::Relaxed),
            Command::EnableGyro => self.state.gyro_enabled.store(true, Ordering::Relaxed),
            Command::StopAll => {
                self.state.accel_enabled.store(false, Ordering::Relaxed);
                self.state.gyro_enabled.store(false, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

// =============================================================================
// SimulatedScanner - Fixed Fleet
// =============================================================================

/// Scanner over a fixed set of advertisements.
///
/// Each entry can be hidden for the first few scan attempts to exercise the
/// repeated-scan loop.
pub struct SimulatedScanner {
    fleet: Vec<(Advertisement, u32)>,
    attempts: AtomicU32,
}

impl SimulatedScanner {
    /// Scanner that reports every advertisement on every scan.
    pub fn new(fleet: Vec<Advertisement>) -> Self {
        Self {
            fleet: fleet.into_iter().map(|ad| (ad, 0)).collect(),
            attempts: AtomicU32::new(0),
        }
    }

    /// Add an advertisement that only shows up from scan `first_attempt`
    /// (zero based) onwards.
    pub fn with_late_device(mut self, ad: Advertisement, first_attempt: u32) -> Self {
        self.fleet.push((ad, first_attempt));
        self
    }

    /// Build a fleet of `count` simulated units named `GMSync-NN`.
    pub fn fleet(count: usize, profile: &ImuProfile) -> Self {
        let ads = (0..count)
            .map(|i| {
                let address = format!("C6:22:D5:9E:0C:{:02X}", 0x50 + i);
                let mut profile = profile.clone();
                profile.seed = profile.seed.map(|s| s + i as u64);
                Advertisement {
                    name: format!("GMSync-{:02}", i + 1),
                    address: address.clone(),
                    transport: Arc::new(SimulatedImu::new(address, profile)),
                }
            })
            .collect();
        Self::new(ads)
    }

    /// Number of scans performed so far.
    pub fn scan_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scanner for SimulatedScanner {
    async fn scan_for(&self, duration: Duration) -> Result<Vec<Advertisement>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        sleep(duration).await;
        Ok(self
            .fleet
            .iter()
            .filter(|(_, first)| attempt >= *first)
            .map(|(ad, _)| ad.clone())
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::encode_command;
    use crate::protocol::{decode_notification, IMU_SERVICE};

    fn collector() -> (NotificationCallback, Arc<Mutex<Vec<Vec<u8>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: NotificationCallback = Arc::new(move |b: &[u8]| sink.lock().push(b.to_vec()));
        (cb, seen)
    }

    #[tokio::test]
    async fn test_mock_transport_records_calls_and_writes() {
        let link = MockTransport::new("AA:BB");
        link.connect().await.unwrap();
        assert!(link.is_connected().await);
        link.write(IMU_SERVICE, WRITE_CHARACTERISTIC, &[0x55, 0xAA, 0x08, 0x00])
            .await
            .unwrap();

        assert_eq!(link.calls(), vec!["connect", "is_connected", "write"]);
        assert_eq!(link.writes(), vec![vec![0x55, 0xAA, 0x08, 0x00]]);
    }

    #[tokio::test]
    async fn test_mock_transport_injected_failures() {
        let link = MockTransport::new("AA:BB");
        link.fail_on(MockFailure::StayDisconnected);
        link.connect().await.unwrap();
        assert!(!link.is_connected().await);

        link.fail_on(MockFailure::Write);
        assert!(link
            .write(IMU_SERVICE, WRITE_CHARACTERISTIC, &[0x00])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mock_transport_notify_requires_subscription() {
        let link = MockTransport::new("AA:BB");
        assert!(!link.notify(&[1, 2, 3]));

        let (cb, seen) = collector();
        link.subscribe(IMU_SERVICE, NOTIFY_CHARACTERISTIC, cb)
            .await
            .unwrap();
        assert!(link.notify(&[1, 2, 3]));
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_simulated_imu_silent_until_enabled() {
        let imu = SimulatedImu::new("sim", ImuProfile::quiet());
        imu.connect().await.unwrap();
        let (cb, seen) = collector();
        imu.subscribe(IMU_SERVICE, NOTIFY_CHARACTERISTIC, cb)
            .await
            .unwrap();

        sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().is_empty());

        imu.write(IMU_SERVICE, WRITE_CHARACTERISTIC, &encode_command(0x0A, &[]))
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;

        let frames = seen.lock().clone();
        assert!(!frames.is_empty());
        for frame in frames {
            let n = decode_notification(&frame).unwrap();
            assert_eq!(n.command, 0x0A);
            assert_eq!(n.axes, [0, 0, 0]);
        }
    }

    #[tokio::test]
    async fn test_simulated_imu_stop_all_silences_stream() {
        let imu = SimulatedImu::new("sim", ImuProfile::quiet());
        imu.connect().await.unwrap();
        let (cb, seen) = collector();
        imu.subscribe(IMU_SERVICE, NOTIFY_CHARACTERISTIC, cb)
            .await
            .unwrap();
        imu.write(IMU_SERVICE, WRITE_CHARACTERISTIC, &encode_command(0x08, &[]))
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        imu.write(IMU_SERVICE, WRITE_CHARACTERISTIC, &encode_command(0xF0, &[]))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        let count = seen.lock().len();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().len(), count);
    }

    #[tokio::test]
    async fn test_simulated_imu_refuses_connections() {
        let imu = SimulatedImu::new("sim", ImuProfile::default());
        imu.refuse_connections();
        assert!(imu.connect().await.is_err());
        assert!(!imu.is_connected().await);
    }

    #[test]
    fn test_quantize_round_trips_gravity() {
        assert_eq!(quantize(1.0, ACCEL_FULL_SCALE_G, ACCEL_RAW_DIVISOR), 2048);
        assert_eq!(quantize(100.0, ACCEL_FULL_SCALE_G, ACCEL_RAW_DIVISOR), i16::MAX);
    }

    #[tokio::test]
    async fn test_simulated_scanner_late_devices() {
        let early = SimulatedScanner::fleet(1, &ImuProfile::default());
        let late = Advertisement {
            name: "GMSync-late".into(),
            address: "D8:6C:8A:A8:38:DE".into(),
            transport: Arc::new(MockTransport::new("D8:6C:8A:A8:38:DE")),
        };
        let scanner = early.with_late_device(late, 1);

        let first = scanner.scan_for(Duration::from_millis(1)).await.unwrap();
        let second = scanner.scan_for(Duration::from_millis(1)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(scanner.scan_count(), 2);
    }
}
