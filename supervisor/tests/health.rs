//! Health tick verdicts and the recovery they trigger

use shared::{ErrorCode, ProcessHealth, StartupPhase};
use std::time::Duration;
use supervisor::core::SkipReason;
use supervisor::HealthVerdict;

mod common;
use common::helpers::settle;
use common::{SupervisorHarness, TestFixtures};

/// An idle supervisor has nothing to check
#[tokio::test]
async fn test_tick_skipped_when_inactive() {
    let harness = SupervisorHarness::new();

    let verdict = harness.supervisor.health_tick().await;

    assert_eq!(verdict, HealthVerdict::Skipped(SkipReason::Inactive));
}

/// A fresh process gets the startup grace, then counts as healthy once it
/// produces output
#[tokio::test(start_paused = true)]
async fn test_warming_up_then_healthy() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(vec![TestFixtures::wifi_24()], None).await.unwrap();

    assert_eq!(harness.supervisor.health_tick().await, HealthVerdict::WarmingUp);
    assert_eq!(harness.supervisor.health_snapshot().process_health, None);

    harness.process.emit("2024-01-01, 00:00:00, 2400000000, 2405000000, 1000000.00, 20, -70.1, -68.3\n").await;
    settle().await;

    assert_eq!(harness.supervisor.health_tick().await, HealthVerdict::Healthy);
    let snapshot = harness.supervisor.health_snapshot();
    assert_eq!(snapshot.process_health, Some(ProcessHealth::Healthy));
    assert_eq!(snapshot.process_startup_phase, StartupPhase::Streaming);
    assert!(snapshot.last_data_received_at.is_some());
    assert_eq!(harness.events.count("spectrum_data"), 1);
}

/// Output is forwarded tagged with the range it was swept on
#[tokio::test(start_paused = true)]
async fn test_output_forwarded_as_spectrum_frames() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(vec![TestFixtures::ism_915()], None).await.unwrap();

    harness.process.emit("line one\n").await;
    harness.process.emit("line two\n").await;
    settle().await;

    let frames: Vec<_> = harness
        .events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            shared::SweepEvent::SpectrumData(frame) => Some(frame),
            _ => None,
        })
        .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].data, "line one\n");
    assert_eq!(frames[1].frequency, Some(TestFixtures::ism_915()));
}

/// A process that vanished without closing stdout is caught by liveness
#[tokio::test(start_paused = true)]
async fn test_dead_process_detected_and_recovered() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(vec![TestFixtures::wifi_24()], None).await.unwrap();
    harness.process.vanish();

    let verdict = harness.supervisor.health_tick().await;

    assert_eq!(verdict, HealthVerdict::ProcessGone { pid: TestFixtures::FIRST_PID });
    assert!(harness.events.error_codes().contains(&ErrorCode::ProcessDied));
    assert_eq!(harness.process.spawn_count(), 2);
    assert_eq!(harness.process.current_pid(), Some(TestFixtures::FIRST_PID + 1));
    assert_eq!(harness.events.count("recovery_complete"), 1);
}

/// No output at all past the startup grace is a failure
#[tokio::test(start_paused = true)]
async fn test_no_initial_data_after_grace() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(vec![TestFixtures::wifi_24()], None).await.unwrap();

    tokio::time::sleep(Duration::from_secs(TestFixtures::STARTUP_GRACE_SECS + 1)).await;
    let verdict = harness.supervisor.health_tick().await;

    assert!(matches!(verdict, HealthVerdict::NoInitialData { .. }));
    assert!(harness.events.error_codes().contains(&ErrorCode::HealthCheckFailed));
    assert_eq!(harness.process.spawn_count(), 2);
}

/// Silence longer than the ceiling after data has flowed is a failure
#[tokio::test(start_paused = true)]
async fn test_stale_data_detected() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(vec![TestFixtures::wifi_24()], None).await.unwrap();
    harness.process.emit("sample\n").await;
    settle().await;

    tokio::time::sleep(Duration::from_secs(TestFixtures::STALE_CEILING_SECS + 1)).await;
    let verdict = harness.supervisor.health_tick().await;

    assert!(matches!(verdict, HealthVerdict::Stale { .. }));
    assert_eq!(harness.process.spawn_count(), 2);
}

/// Data from before a recovery restart does not vouch for the new process
#[tokio::test(start_paused = true)]
async fn test_recovery_restart_resets_data_clock() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(vec![TestFixtures::wifi_24()], None).await.unwrap();
    harness.process.emit("sample\n").await;
    settle().await;

    harness.supervisor.recover("manual").await;

    assert_eq!(harness.supervisor.health_tick().await, HealthVerdict::WarmingUp);
}

/// The periodic task runs ticks on its own interval
#[tokio::test(start_paused = true)]
async fn test_periodic_health_task() {
    let config = TestFixtures::config().with_health_interval(Duration::from_secs(1));
    let harness = SupervisorHarness::with_config(config);
    harness.supervisor.start(vec![TestFixtures::wifi_24()], None).await.unwrap();
    harness.process.vanish();

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(harness.process.spawn_count(), 2);
    assert!(harness.supervisor.is_active());
}
