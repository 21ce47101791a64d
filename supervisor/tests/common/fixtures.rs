//! Test fixtures and data for supervisor tests

use shared::FrequencyRange;
use std::time::Duration;
use supervisor::{HealthThresholds, RecoveryConfig, SupervisorConfig};

pub struct TestFixtures;

impl TestFixtures {
    pub const FIRST_PID: u32 = 1000;
    pub const SETTLE_MS: u64 = 100;
    pub const RETRY_DELAY_MS: u64 = 100;
    pub const STARTUP_GRACE_SECS: u64 = 3;
    pub const STALE_CEILING_SECS: u64 = 5;

    pub fn wifi_24() -> FrequencyRange {
        FrequencyRange::new(2400.0, 2420.0).unwrap()
    }

    pub fn ism_915() -> FrequencyRange {
        FrequencyRange::new(905.0, 925.0).unwrap()
    }

    pub fn wifi_58() -> FrequencyRange {
        FrequencyRange::new(5790.0, 5810.0).unwrap()
    }

    /// Short delays everywhere; the health loop is parked far out so tests
    /// drive `health_tick` themselves
    pub fn config() -> SupervisorConfig {
        SupervisorConfig::default()
            .with_health(HealthThresholds {
                stale_data_ceiling: Duration::from_secs(Self::STALE_CEILING_SECS),
                startup_grace: Duration::from_secs(Self::STARTUP_GRACE_SECS),
                low_memory_ratio: 0.10,
            })
            .with_recovery(RecoveryConfig {
                max_attempts: 3,
                settle_delay: Duration::from_millis(Self::SETTLE_MS),
                retry_delay: Duration::from_millis(Self::RETRY_DELAY_MS),
                spawn_timeout: Duration::from_secs(1),
                ..RecoveryConfig::default()
            })
            .with_health_interval(Duration::from_secs(3600))
    }
}
