//! Supervisor configuration

use crate::core::command::SweepCommandConfig;
use crate::core::cycler::{DEFAULT_CYCLE_TIME, MAX_CYCLE_TIME};
use crate::core::error_tracker::{
    TrackerLimits, DEFAULT_BLACKLIST_THRESHOLD, DEFAULT_MAX_FAILURES_PER_MINUTE, DEFAULT_MAX_RECOVERY_ATTEMPTS,
    DEFAULT_RECOVERY_COOLDOWN,
};
use crate::core::health::HealthThresholds;
use crate::core::retry::Backoff;
use crate::error::{SupervisorError, SupervisorResult};
use std::time::Duration;

/// Recovery budget and pacing
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    pub max_attempts: u32,
    /// Pause between cleanup and respawn inside one attempt
    pub settle_delay: Duration,
    /// Base delay between failed attempts
    pub retry_delay: Duration,
    pub backoff: Backoff,
    /// Deadline for a single spawn call
    pub spawn_timeout: Duration,
    /// Minimum gap between the end of one recovery and the start of the next
    pub cooldown: Duration,
    /// Failures within a minute at which supervision gives up
    pub max_failures_per_minute: u32,
    /// Errors on one range before it leaves the cycle
    pub blacklist_threshold: u32,
}

impl RecoveryConfig {
    pub fn tracker_limits(&self) -> TrackerLimits {
        TrackerLimits {
            max_attempts: self.max_attempts,
            max_failures_per_minute: self.max_failures_per_minute,
            blacklist_threshold: self.blacklist_threshold,
            cooldown: self.cooldown,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            settle_delay: Duration::from_millis(2_000),
            retry_delay: Duration::from_millis(1_000),
            backoff: Backoff::Exponential,
            spawn_timeout: Duration::from_secs(10),
            cooldown: DEFAULT_RECOVERY_COOLDOWN,
            max_failures_per_minute: DEFAULT_MAX_FAILURES_PER_MINUTE,
            blacklist_threshold: DEFAULT_BLACKLIST_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    pub command: SweepCommandConfig,
    pub health: HealthThresholds,
    pub recovery: RecoveryConfig,
    pub health_interval: Duration,
    pub default_cycle_time: Duration,
    /// Overrides the derived switching time when set
    pub switching_time: Option<Duration>,
    /// Deadline for one host memory sample
    pub probe_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            command: SweepCommandConfig::default(),
            health: HealthThresholds::default(),
            recovery: RecoveryConfig::default(),
            health_interval: Duration::from_secs(30),
            default_cycle_time: DEFAULT_CYCLE_TIME,
            switching_time: None,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl SupervisorConfig {
    /// Configure the sweep command (fluent API)
    pub fn with_command(mut self, command: SweepCommandConfig) -> Self {
        self.command = command;
        self
    }

    /// Configure health thresholds (fluent API)
    pub fn with_health(mut self, health: HealthThresholds) -> Self {
        self.health = health;
        self
    }

    /// Configure recovery pacing (fluent API)
    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    /// Configure the health tick (fluent API)
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Configure the default dwell per range (fluent API)
    pub fn with_default_cycle_time(mut self, cycle_time: Duration) -> Self {
        self.default_cycle_time = cycle_time;
        self
    }

    /// Pin the switching time instead of deriving it (fluent API)
    pub fn with_switching_time(mut self, switching_time: Option<Duration>) -> Self {
        self.switching_time = switching_time;
        self
    }

    pub fn validate(&self) -> SupervisorResult<()> {
        if self.recovery.max_attempts == 0 {
            return Err(SupervisorError::config("recovery.max_attempts", 0));
        }
        if self.health_interval.is_zero() {
            return Err(SupervisorError::config("health_interval", "0ms"));
        }
        if self.default_cycle_time.is_zero() || self.default_cycle_time > MAX_CYCLE_TIME {
            return Err(SupervisorError::config(
                "default_cycle_time",
                format!("{}ms", self.default_cycle_time.as_millis()),
            ));
        }
        if self.recovery.max_failures_per_minute == 0 {
            return Err(SupervisorError::config("recovery.max_failures_per_minute", 0));
        }
        if self.recovery.blacklist_threshold == 0 {
            return Err(SupervisorError::config("recovery.blacklist_threshold", 0));
        }
        if self.recovery.spawn_timeout.is_zero() {
            return Err(SupervisorError::config("recovery.spawn_timeout", "0ms"));
        }
        if !(0.0..=1.0).contains(&self.health.low_memory_ratio) {
            return Err(SupervisorError::config("health.low_memory_ratio", self.health.low_memory_ratio));
        }
        if self.command.binary.as_os_str().is_empty() {
            return Err(SupervisorError::config("command.binary", "<empty>"));
        }
        Ok(())
    }
}
