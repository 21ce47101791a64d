//! Frequency cycling through the supervisor

use shared::ErrorCode;
use std::time::Duration;
use supervisor::core::SkipReason;
use supervisor::{HealthVerdict, RecoveryConfig, SupervisorError};

mod common;
use common::helpers::{settle, SlowProbe};
use common::{SupervisorHarness, TestFixtures};

const DWELL: Duration = Duration::from_secs(1);
// Derived from the dwell: a quarter of it, floored at 500ms
const SWITCHING: Duration = Duration::from_millis(500);

fn ranges() -> Vec<shared::FrequencyRange> {
    vec![TestFixtures::ism_915(), TestFixtures::wifi_24(), TestFixtures::wifi_58()]
}

fn range_arg(args: &[String]) -> &str {
    let flag = args.iter().position(|a| a == "-f").unwrap();
    &args[flag + 1]
}

/// After one dwell plus the switching gap the next range is being swept
#[tokio::test(start_paused = true)]
async fn test_cycle_advances_after_dwell() {
    let harness = SupervisorHarness::new();
    let status = harness.supervisor.start(ranges(), Some(DWELL)).await.unwrap();
    assert!(status.cycle.is_cycling);

    tokio::time::sleep(DWELL + SWITCHING + Duration::from_millis(100)).await;

    let cycle = harness.supervisor.cycle_state();
    assert_eq!(cycle.index, 1);
    assert_eq!(cycle.current_frequency, Some(TestFixtures::wifi_24()));
    assert!(!cycle.in_transition);

    let spawns = harness.process.spawn_args();
    assert_eq!(spawns.len(), 2);
    assert_eq!(range_arg(&spawns[0]), "905:925");
    assert_eq!(range_arg(&spawns[1]), "2400:2420");
    assert!(harness.events.count("cycle_config") >= 2);
}

/// The cycle wraps back to the first range
#[tokio::test(start_paused = true)]
async fn test_cycle_wraps_around() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(ranges(), Some(DWELL)).await.unwrap();

    // Each step takes one dwell plus one switching gap
    let step = DWELL + SWITCHING;
    tokio::time::sleep(step * 3 + Duration::from_millis(100)).await;

    let cycle = harness.supervisor.cycle_state();
    assert_eq!(cycle.index, 0);
    assert_eq!(cycle.current_frequency, Some(TestFixtures::ism_915()));
    assert_eq!(harness.process.spawn_count(), 4);
}

/// Deliberate silence during a switch does not fail the health check
#[tokio::test(start_paused = true)]
async fn test_health_skipped_during_transition() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(ranges(), Some(DWELL)).await.unwrap();

    tokio::time::sleep(DWELL + Duration::from_millis(100)).await;
    assert!(harness.supervisor.cycle_state().in_transition);

    let verdict = harness.supervisor.health_tick().await;

    assert_eq!(verdict, HealthVerdict::Skipped(SkipReason::InTransition));
    assert_eq!(harness.events.count("recovery_start"), 0);
}

/// The killed process closing its stdout during a switch is not a death
#[tokio::test(start_paused = true)]
async fn test_switch_kill_is_not_reported_as_death() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(ranges(), Some(DWELL)).await.unwrap();

    tokio::time::sleep(DWELL + SWITCHING + Duration::from_millis(100)).await;

    assert!(harness.events.error_codes().is_empty());
    assert_eq!(harness.events.count("recovery_start"), 0);
}

/// A single range never cycles
#[tokio::test(start_paused = true)]
async fn test_single_range_does_not_cycle() {
    let harness = SupervisorHarness::new();
    let status = harness.supervisor.start(vec![TestFixtures::wifi_24()], Some(DWELL)).await.unwrap();
    assert!(!status.cycle.is_cycling);

    tokio::time::sleep(DWELL * 3).await;

    assert_eq!(harness.process.spawn_count(), 1);
    assert_eq!(harness.supervisor.cycle_state().index, 0);
}

/// Stop in the middle of a switch leaves nothing behind
#[tokio::test(start_paused = true)]
async fn test_stop_during_switch() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(ranges(), Some(DWELL)).await.unwrap();
    tokio::time::sleep(DWELL + Duration::from_millis(100)).await;

    harness.supervisor.stop().await.unwrap();
    tokio::time::sleep(SWITCHING * 2).await;

    assert!(!harness.supervisor.is_active());
    assert_eq!(harness.process.spawn_count(), 1);
    let cycle = harness.supervisor.cycle_state();
    assert!(!cycle.is_cycling);
    assert!(!cycle.in_transition);
}

/// A failed spawn on the new range is handed to recovery, which retries on
/// that same range
#[tokio::test(start_paused = true)]
async fn test_failed_switch_recovers_on_new_range() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(ranges(), Some(DWELL)).await.unwrap();
    harness.process.fail_next_spawns(1);

    tokio::time::sleep(DWELL + SWITCHING + Duration::from_millis(TestFixtures::SETTLE_MS * 3)).await;

    let spawns = harness.process.spawn_args();
    assert_eq!(spawns.len(), 3);
    assert_eq!(range_arg(&spawns[2]), "2400:2420");
    assert_eq!(harness.events.count("recovery_complete"), 1);
    assert_eq!(harness.supervisor.cycle_state().index, 1);
}

/// A device that goes quiet while cycling is caught once the silence
/// outlasts the ceiling, even though every switch spawns a new process
#[tokio::test(start_paused = true)]
async fn test_silent_device_detected_while_cycling() {
    let harness = SupervisorHarness::new();
    harness
        .supervisor
        .start(vec![TestFixtures::ism_915(), TestFixtures::wifi_24()], Some(DWELL))
        .await
        .unwrap();
    harness.process.emit("sample\n").await;
    settle().await;

    let mut verdicts = Vec::new();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        verdicts.push(harness.supervisor.health_tick().await);
        if harness.events.count("recovery_start") > 0 {
            break;
        }
    }

    assert!(
        verdicts.iter().any(|v| matches!(v, HealthVerdict::Stale { .. })),
        "verdicts: {verdicts:?}"
    );
    assert!(harness.events.error_codes().contains(&ErrorCode::HealthCheckFailed));
    assert_eq!(harness.events.count("recovery_start"), 1);
}

/// A device that never produced anything is caught after the startup grace
/// even when switches keep replacing the process
#[tokio::test(start_paused = true)]
async fn test_no_initial_data_detected_while_cycling() {
    let harness = SupervisorHarness::new();
    harness
        .supervisor
        .start(vec![TestFixtures::ism_915(), TestFixtures::wifi_24()], Some(DWELL))
        .await
        .unwrap();

    let mut verdicts = Vec::new();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        verdicts.push(harness.supervisor.health_tick().await);
        if harness.events.count("recovery_start") > 0 {
            break;
        }
    }

    assert!(
        verdicts.iter().any(|v| matches!(v, HealthVerdict::NoInitialData { .. })),
        "verdicts: {verdicts:?}"
    );
    assert_eq!(harness.events.count("recovery_start"), 1);
}

/// A tick whose memory sample outlasts the dwell sees the switch kill its
/// pid; the verdict is dropped instead of reported as a death
#[tokio::test(start_paused = true)]
async fn test_tick_spanning_switch_is_discarded() {
    let probe = SlowProbe::new(Duration::from_millis(300));
    let harness = SupervisorHarness::with_probe(TestFixtures::config(), probe);
    harness.supervisor.start(ranges(), Some(DWELL)).await.unwrap();
    harness.process.emit("sample\n").await;

    tokio::time::sleep(DWELL - Duration::from_millis(100)).await;
    let verdict = harness.supervisor.health_tick().await;

    assert_eq!(verdict, HealthVerdict::Skipped(SkipReason::Superseded));
    tokio::time::sleep(SWITCHING).await;
    assert!(harness.events.error_codes().is_empty());
    assert_eq!(harness.events.count("recovery_start"), 0);
    assert_eq!(harness.process.spawn_count(), 2);
}

/// Steady ticks across many dwells on a streaming device only ever see
/// healthy or skipped verdicts, and the spawns follow the cycle order
#[tokio::test(start_paused = true)]
async fn test_ticks_across_many_switches_stay_quiet() {
    let probe = SlowProbe::new(Duration::from_millis(300));
    let harness = SupervisorHarness::with_probe(TestFixtures::config(), probe);
    harness.supervisor.start(ranges(), Some(DWELL)).await.unwrap();

    for _ in 0..25 {
        harness.process.emit("sample\n").await;
        let verdict = harness.supervisor.health_tick().await;
        assert!(!verdict.is_failure(), "{verdict:?}");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(harness.events.error_codes().is_empty());
    assert_eq!(harness.events.count("recovery_start"), 0);
    let spawns = harness.process.spawn_args();
    assert!(spawns.len() >= 4);
    let expected = ["905:925", "2400:2420", "5790:5810"];
    for (i, args) in spawns.iter().enumerate() {
        assert_eq!(range_arg(args), expected[i % expected.len()]);
    }
}

/// Skipping jumps straight to the chosen entry through a normal switch
#[tokio::test(start_paused = true)]
async fn test_skip_to_frequency() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(ranges(), Some(Duration::from_secs(60))).await.unwrap();

    let state = harness.supervisor.skip_to_frequency(2).await.unwrap();

    assert_eq!(state.index, 2);
    assert_eq!(state.current_frequency, Some(TestFixtures::wifi_58()));
    let spawns = harness.process.spawn_args();
    assert_eq!(spawns.len(), 2);
    assert_eq!(range_arg(&spawns[1]), "5790:5810");

    assert!(matches!(
        harness.supervisor.skip_to_frequency(7).await,
        Err(SupervisorError::InvalidConfig { .. })
    ));
    assert_eq!(harness.supervisor.skip_to_frequency(2).await.unwrap().index, 2);
    assert_eq!(harness.process.spawn_count(), 2);
}

/// A new dwell applies from the next switch on
#[tokio::test(start_paused = true)]
async fn test_update_timing_changes_dwell() {
    let harness = SupervisorHarness::new();
    harness.supervisor.start(ranges(), Some(DWELL)).await.unwrap();

    let payload = harness.supervisor.update_timing(Some(Duration::from_secs(5)), None).unwrap();
    assert_eq!(payload.cycle_time_ms, 5_000);
    assert_eq!(payload.switching_time_ms, SWITCHING.as_millis() as u64);

    // The dwell already under way keeps its old length
    tokio::time::sleep(DWELL + SWITCHING + Duration::from_millis(100)).await;
    assert_eq!(harness.supervisor.cycle_state().index, 1);

    tokio::time::sleep(DWELL * 2).await;
    assert_eq!(harness.supervisor.cycle_state().index, 1);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(harness.supervisor.cycle_state().index, 2);

    assert!(matches!(
        harness.supervisor.update_timing(Some(Duration::ZERO), None),
        Err(SupervisorError::InvalidConfig { .. })
    ));
}

/// A range that keeps failing is dropped and recovery moves to the next one
#[tokio::test(start_paused = true)]
async fn test_failing_range_blacklisted() {
    let mut config = TestFixtures::config();
    config.recovery = RecoveryConfig {
        cooldown: Duration::ZERO,
        ..config.recovery.clone()
    };
    let harness = SupervisorHarness::with_config(config);
    harness
        .supervisor
        .start(vec![TestFixtures::ism_915(), TestFixtures::wifi_24()], Some(Duration::from_secs(60)))
        .await
        .unwrap();

    for _ in 0..3 {
        harness.supervisor.recover("No data for 7201s").await;
    }

    let spawns = harness.process.spawn_args();
    assert_eq!(spawns.len(), 4);
    assert_eq!(range_arg(&spawns[2]), "905:925");
    assert_eq!(range_arg(&spawns[3]), "2400:2420");
    assert!(harness.events.error_codes().contains(&ErrorCode::FrequencyBlacklisted));

    let config = harness.supervisor.cycle_config();
    assert_eq!(config.blacklisted, vec![TestFixtures::ism_915()]);
    assert_eq!(config.next_frequency, None);
    assert_eq!(harness.supervisor.cycle_state().current_frequency, Some(TestFixtures::wifi_24()));
}
