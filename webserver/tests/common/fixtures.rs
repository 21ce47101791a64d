//! Test fixtures and request bodies for webserver tests

use serde_json::{json, Value};
use std::time::Duration;
use supervisor::{RecoveryConfig, SupervisorConfig};
use webserver::BroadcasterConfig;

pub struct TestFixtures;

impl TestFixtures {
    pub const FIRST_PID: u32 = 4200;

    /// Periodic tasks parked far out so requests see a quiet supervisor
    pub fn supervisor_config() -> SupervisorConfig {
        SupervisorConfig::default()
            .with_recovery(RecoveryConfig {
                max_attempts: 2,
                settle_delay: Duration::from_millis(10),
                retry_delay: Duration::from_millis(10),
                spawn_timeout: Duration::from_secs(1),
                ..RecoveryConfig::default()
            })
            .with_health_interval(Duration::from_secs(3600))
            .with_default_cycle_time(Duration::from_secs(3600))
    }

    pub fn broadcaster_config() -> BroadcasterConfig {
        BroadcasterConfig {
            spectrum_throttle: Duration::ZERO,
            ..BroadcasterConfig::default()
        }
    }

    /// Wi-Fi channel 6 centre, 2427:2447 on the wire
    pub fn start_channel_6() -> Value {
        json!({ "frequencies": [{ "value": 2437, "unit": "MHz" }] })
    }

    pub fn start_two_bands() -> Value {
        json!({
            "frequencies": [{ "value": 915 }, { "value": 2.437, "unit": "GHz" }],
            "cycleTimeMs": 5000,
        })
    }

    pub fn hardware(tool: &str, device: &str) -> Value {
        json!({ "tool": tool, "device": device })
    }
}
