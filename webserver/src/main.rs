//! Sweep supervisor service entry point
//!
//! Every flag can also come from a `SWEEP_*` environment variable, and a
//! `.env` file in the working directory is loaded first.

use anyhow::Context;
use clap::Parser;
use shared::logging::{self, Component};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use supervisor::{
    HealthThresholds, RealHostProbe, RealProcessManager, RecoveryConfig, ResourceArbiter, SupervisorConfig,
    SweepCommandConfig, SweepSupervisor,
};

use webserver::{AppState, BroadcasterConfig, StreamBroadcaster, WebServer};

#[derive(Parser, Debug)]
#[command(name = "webserver")]
#[command(about = "HackRF sweep supervisor with HTTP control and a live event stream")]
struct Args {
    /// Address for the HTTP server
    #[arg(long, env = "SWEEP_BIND", default_value = "127.0.0.1:8092")]
    bind: SocketAddr,

    /// Sweep binary, resolved on PATH when not absolute
    #[arg(long, env = "SWEEP_BINARY", default_value = "hackrf_sweep")]
    sweep_binary: PathBuf,

    /// Serial of the board to use when several are attached
    #[arg(long, env = "SWEEP_DEVICE_SERIAL")]
    device_serial: Option<String>,

    #[arg(long, env = "SWEEP_BIN_WIDTH_HZ", default_value_t = 20_000)]
    bin_width_hz: u32,

    /// Default dwell per range when a start request gives none
    #[arg(long, env = "SWEEP_CYCLE_TIME_MS", default_value_t = 10_000)]
    cycle_time_ms: u64,

    /// Fixed pause between ranges; derived from the dwell when unset
    #[arg(long, env = "SWEEP_SWITCHING_TIME_MS")]
    switching_time_ms: Option<u64>,

    #[arg(long, env = "SWEEP_HEALTH_INTERVAL_SECS", default_value_t = 30)]
    health_interval_secs: u64,

    /// Silence ceiling once data has flowed
    #[arg(long, env = "SWEEP_STALE_DATA_SECS", default_value_t = 7_200)]
    stale_data_secs: u64,

    /// Time a fresh process gets to produce its first output
    #[arg(long, env = "SWEEP_STARTUP_GRACE_SECS", default_value_t = 60)]
    startup_grace_secs: u64,

    #[arg(long, env = "SWEEP_LOW_MEMORY_RATIO", default_value_t = 0.10)]
    low_memory_ratio: f64,

    #[arg(long, env = "SWEEP_MAX_RECOVERY_ATTEMPTS", default_value_t = 3)]
    max_recovery_attempts: u32,

    /// Pause after a recovery before another one may start
    #[arg(long, env = "SWEEP_RECOVERY_COOLDOWN_MS", default_value_t = 2_000)]
    recovery_cooldown_ms: u64,

    /// Failures within one minute that end supervision
    #[arg(long, env = "SWEEP_MAX_FAILURES_PER_MINUTE", default_value_t = 5)]
    max_failures_per_minute: u32,

    /// Errors on one range before it leaves the cycle
    #[arg(long, env = "SWEEP_BLACKLIST_THRESHOLD", default_value_t = 3)]
    blacklist_threshold: u32,

    #[arg(long, env = "SWEEP_SETTLE_DELAY_MS", default_value_t = 2_000)]
    settle_delay_ms: u64,

    #[arg(long, env = "SWEEP_SPAWN_TIMEOUT_MS", default_value_t = 10_000)]
    spawn_timeout_ms: u64,

    /// Minimum gap between spectrum frames to one consumer
    #[arg(long, env = "SWEEP_SPECTRUM_THROTTLE_MS", default_value_t = 50)]
    spectrum_throttle_ms: u64,

    #[arg(long, env = "SWEEP_HEARTBEAT_SECS", default_value_t = 10)]
    heartbeat_secs: u64,

    /// Consumers with no successful delivery for this long are dropped
    #[arg(long, env = "SWEEP_INACTIVITY_SECS", default_value_t = 60)]
    inactivity_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SWEEP_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn supervisor_config(&self) -> SupervisorConfig {
        let command = SweepCommandConfig::new(&self.sweep_binary)
            .with_device_serial(self.device_serial.clone())
            .with_bin_width(self.bin_width_hz);

        SupervisorConfig::default()
            .with_command(command)
            .with_health(HealthThresholds {
                stale_data_ceiling: Duration::from_secs(self.stale_data_secs),
                startup_grace: Duration::from_secs(self.startup_grace_secs),
                low_memory_ratio: self.low_memory_ratio,
            })
            .with_recovery(RecoveryConfig {
                max_attempts: self.max_recovery_attempts,
                settle_delay: Duration::from_millis(self.settle_delay_ms),
                spawn_timeout: Duration::from_millis(self.spawn_timeout_ms),
                cooldown: Duration::from_millis(self.recovery_cooldown_ms),
                max_failures_per_minute: self.max_failures_per_minute,
                blacklist_threshold: self.blacklist_threshold,
                ..RecoveryConfig::default()
            })
            .with_health_interval(Duration::from_secs(self.health_interval_secs))
            .with_default_cycle_time(Duration::from_millis(self.cycle_time_ms))
            .with_switching_time(self.switching_time_ms.map(Duration::from_millis))
    }

    fn broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            spectrum_throttle: Duration::from_millis(self.spectrum_throttle_ms),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            inactivity_timeout: Duration::from_secs(self.inactivity_secs),
            ..BroadcasterConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    logging::init_tracing(Some(&args.log_level));
    logging::log_startup(Component::WebServer, &format!("sweep supervisor on {}", args.bind));

    let supervisor_config = args.supervisor_config();
    supervisor_config.validate().context("invalid supervisor configuration")?;
    let broadcaster_config = args.broadcaster_config();
    broadcaster_config.validate().context("invalid broadcaster configuration")?;

    let broadcaster = StreamBroadcaster::new(broadcaster_config);
    let arbiter = Arc::new(ResourceArbiter::new().with_events(broadcaster.clone()));
    let probe = RealHostProbe::new().context("host probe setup")?;
    let process = RealProcessManager::new(&supervisor_config.command, Arc::new(probe.clone()));
    let supervisor = SweepSupervisor::new(process, probe, broadcaster.clone(), arbiter, supervisor_config);

    let server = WebServer::new(AppState::new(supervisor, broadcaster), args.bind);
    server.run().await?;

    logging::log_success(Component::WebServer, "Sweep supervisor stopped gracefully");
    Ok(())
}
