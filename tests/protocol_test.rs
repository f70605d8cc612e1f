//! Wire protocol tests: fixed frames and a lossy simulated link

use imu_qa::config::SessionConfig;
use imu_qa::hardware::mock::{ImuProfile, SimulatedImu};
use imu_qa::hardware::Transport;
use imu_qa::measurement::SampleKind;
use imu_qa::protocol::{decode_notification, encode_command, scale_reading, Reading};
use imu_qa::DeviceSession;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_reference_accel_frame() {
    // 0x0800 = 2048 counts = 1 g on z.
    let frame = [0x55, 0xAA, 0x08, 0x06, 0x00, 0x00, 0xFF, 0xFF, 0x08, 0x00];
    let n = decode_notification(&frame).unwrap();
    assert_eq!(n.command, 0x08);
    assert_eq!(n.axes, [0, -1, 2048]);
    match scale_reading(&n) {
        Some(Reading::Accel([x, y, z])) => {
            assert_eq!(x, 0.0);
            assert!((y + 16.0 / 32768.0).abs() < 1e-12);
            assert_eq!(z, 1.0);
        }
        other => panic!("unexpected reading {other:?}"),
    }
}

#[test]
fn test_command_frames() {
    assert_eq!(encode_command(0x08, &[]), [0x55, 0xAA, 0x08, 0x00]);
    assert_eq!(encode_command(0xF0, &[0x01, 0x02]), [0x55, 0xAA, 0xF0, 0x02, 0x01, 0x02]);
    assert_eq!(encode_command(0x0A, &[0u8; 255])[3], 0xFF);
}

#[tokio::test]
async fn test_lossy_link_drops_corrupt_frames_silently() {
    let profile = ImuProfile {
        corrupt_ratio: 0.3,
        seed: Some(42),
        ..ImuProfile::default()
    };
    let imu = Arc::new(SimulatedImu::new("SIM", profile));
    let session = DeviceSession::new(
        "SIM",
        imu.clone() as Arc<dyn Transport>,
        &SessionConfig {
            enable_delay: Duration::from_millis(5),
        },
    );

    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    session.stop().await;

    let samples = session.drain_samples();
    let sent = imu.frames_sent();
    assert!(session.rejected_frames() > 0);
    assert_eq!(samples.len() as u64 + session.rejected_frames(), sent);
    assert!(samples.iter().any(|s| s.kind == SampleKind::Accel));
    assert!(samples.iter().any(|s| s.kind == SampleKind::Gyro));
    for sample in samples.iter().filter(|s| s.kind == SampleKind::Accel) {
        assert!((sample.accel_magnitude() - 1.0).abs() < 0.01);
    }
}
