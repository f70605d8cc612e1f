//! Integration tests for DeviceSession
//!
//! Drives sessions over the scripted `MockTransport` to check command order,
//! failure handling and buffer behaviour under concurrent producers.

use imu_qa::config::SessionConfig;
use imu_qa::error::SessionError;
use imu_qa::hardware::mock::{MockFailure, MockTransport};
use imu_qa::hardware::Transport;
use imu_qa::protocol::codec::encode_notification;
use imu_qa::{DeviceSession, SessionState};
use std::sync::Arc;
use std::time::Duration;

fn session_over(link: &Arc<MockTransport>) -> DeviceSession {
    let config = SessionConfig {
        enable_delay: Duration::from_millis(1),
    };
    DeviceSession::new(link.address(), link.clone() as Arc<dyn Transport>, &config)
}

// =============================================================================
// Start
// =============================================================================

#[tokio::test]
async fn test_start_call_sequence() {
    let link = Arc::new(MockTransport::new("C6:22:D5:9E:0C:53"));
    let session = session_over(&link);

    session.start().await.unwrap();

    assert_eq!(
        link.calls(),
        vec!["connect", "is_connected", "subscribe", "write", "write"]
    );
    assert_eq!(link.writes()[0], vec![0x55, 0xAA, 0x08, 0x00]);
    assert_eq!(link.writes()[1], vec![0x55, 0xAA, 0x0A, 0x00]);
    session.stop().await;
}

#[tokio::test]
async fn test_link_down_after_connect() {
    let link = Arc::new(MockTransport::new("AA"));
    link.fail_on(MockFailure::StayDisconnected);
    let session = session_over(&link);

    assert!(matches!(
        session.start().await,
        Err(SessionError::NotConnected)
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(link.writes().is_empty());
}

#[tokio::test]
async fn test_subscribe_failure_disconnects() {
    let link = Arc::new(MockTransport::new("AA"));
    link.fail_on(MockFailure::Subscribe);
    let session = session_over(&link);

    assert!(matches!(
        session.start().await,
        Err(SessionError::Subscribe(_))
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(
        link.calls(),
        vec!["connect", "is_connected", "subscribe", "disconnect"]
    );
}

#[tokio::test]
async fn test_enable_failure_unwinds_subscription() {
    let link = Arc::new(MockTransport::new("AA"));
    link.fail_on(MockFailure::Write);
    let session = session_over(&link);

    assert!(matches!(
        session.start().await,
        Err(SessionError::EnableSensors(_))
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!link.is_subscribed());
    assert!(!link.is_connected().await);
}

// =============================================================================
// Stop
// =============================================================================

#[tokio::test]
async fn test_stop_is_idempotent() {
    let link = Arc::new(MockTransport::new("AA"));
    let session = session_over(&link);
    session.start().await.unwrap();

    session.stop().await;
    let after_first = link.calls().len();
    session.stop().await;
    session.stop().await;

    assert_eq!(link.calls().len(), after_first);
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(link.writes().last().unwrap(), &vec![0x55, 0xAA, 0xF0, 0x00]);
}

#[tokio::test]
async fn test_stop_attempts_every_step_despite_failures() {
    let link = Arc::new(MockTransport::new("AA"));
    let session = session_over(&link);
    session.start().await.unwrap();

    link.fail_on(MockFailure::Write);
    link.fail_on(MockFailure::Unsubscribe);
    session.stop().await;

    let calls = link.calls();
    let tail = &calls[calls.len() - 4..];
    assert_eq!(tail, ["write", "unsubscribe", "is_connected", "disconnect"]);
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_no_samples_after_stop() {
    let link = Arc::new(MockTransport::new("AA"));
    let session = session_over(&link);
    session.start().await.unwrap();
    session.stop().await;

    assert!(!link.notify(&encode_notification(0x08, [0, 0, 2048])));
    assert!(session.drain_samples().is_empty());
}

// =============================================================================
// Buffer
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_drain_concurrent_with_notifications() {
    const PRODUCERS: usize = 4;
    const FRAMES_EACH: usize = 2_000;

    let link = Arc::new(MockTransport::new("AA"));
    let session = Arc::new(session_over(&link));
    session.start().await.unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let link = link.clone();
            std::thread::spawn(move || {
                for i in 0..FRAMES_EACH {
                    // Encode producer and sequence number in the gyro axes.
                    let frame = encode_notification(0x0A, [p as i16, (i % 1000) as i16, (i / 1000) as i16]);
                    assert!(link.notify(&frame));
                }
            })
        })
        .collect();

    let mut collected = Vec::new();
    while producers.iter().any(|h| !h.is_finished()) {
        collected.extend(session.drain_samples());
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    for handle in producers {
        handle.join().unwrap();
    }
    collected.extend(session.drain_samples());

    assert_eq!(collected.len(), PRODUCERS * FRAMES_EACH);

    // Per-producer order survives draining.
    for p in 0..PRODUCERS {
        let seq: Vec<usize> = collected
            .iter()
            .filter(|s| (s.gyro_dps[0] * 28571.0 / 500.0).round() as usize == p)
            .map(|s| {
                let lo = (s.gyro_dps[1] * 28571.0 / 500.0).round() as usize;
                let hi = (s.gyro_dps[2] * 28571.0 / 500.0).round() as usize;
                hi * 1000 + lo
            })
            .collect();
        assert_eq!(seq, (0..FRAMES_EACH).collect::<Vec<_>>());
    }
    session.stop().await;
}

#[tokio::test]
async fn test_drain_before_start_is_empty() {
    let link = Arc::new(MockTransport::new("AA"));
    let session = session_over(&link);
    assert!(session.drain_samples().is_empty());
    assert!(!session.is_running());
}
