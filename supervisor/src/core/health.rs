//! Health verdicts for the sweep process
//!
//! Pure evaluation only. The periodic tick that gathers observations and acts
//! on the verdict lives in the supervisor.

use crate::traits::MemoryStats;
use std::time::Duration;

/// Staleness and memory thresholds, all configurable
#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    /// Silence ceiling once data has flowed; sweeps can be legitimately slow
    pub stale_data_ceiling: Duration,
    /// How long a fresh process may run before its first datum
    pub startup_grace: Duration,
    /// Available/total memory ratio below which a warning is logged
    pub low_memory_ratio: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            stale_data_ceiling: Duration::from_secs(2 * 60 * 60),
            startup_grace: Duration::from_secs(60),
            low_memory_ratio: 0.10,
        }
    }
}

/// Reasons a tick does nothing at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Inactive,
    NoProcess,
    Recovering,
    /// A deliberate frequency switch; silence is expected
    InTransition,
    /// The process was killed or replaced while the tick ran
    Superseded,
}

/// What one tick saw about the tracked process
#[derive(Debug, Clone, PartialEq)]
pub struct HealthObservation {
    pub pid: u32,
    pub alive: bool,
    /// Time since supervision started or last restarted the sweep.
    /// Frequency switches do not reset it.
    pub uptime: Duration,
    /// Time since the sweep last produced output on any range, if it has
    /// since the last restart
    pub since_last_data: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealthVerdict {
    Skipped(SkipReason),
    ProcessGone { pid: u32 },
    Stale { silent_for: Duration },
    NoInitialData { uptime: Duration },
    Healthy,
    /// Alive, no data yet, still inside the startup grace
    WarmingUp,
}

impl HealthVerdict {
    /// Verdicts that call for recovery
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            HealthVerdict::ProcessGone { .. } | HealthVerdict::Stale { .. } | HealthVerdict::NoInitialData { .. }
        )
    }

    pub fn reason(&self) -> String {
        match self {
            HealthVerdict::ProcessGone { pid } => format!("Process no longer exists (pid {pid})"),
            HealthVerdict::Stale { silent_for } => format!("No data for {}s", silent_for.as_secs()),
            HealthVerdict::NoInitialData { uptime } => format!("No initial data received after {}s", uptime.as_secs()),
            HealthVerdict::Healthy => "healthy".to_string(),
            HealthVerdict::WarmingUp => "warming up".to_string(),
            HealthVerdict::Skipped(reason) => format!("skipped: {reason:?}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthMonitor {
    thresholds: HealthThresholds,
}

impl HealthMonitor {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Re-entrancy and applicability gate, checked before anything is probed
    pub fn skip_reason(
        &self,
        active: bool,
        tracked_pid: Option<u32>,
        recovering: bool,
        in_transition: bool,
    ) -> Option<SkipReason> {
        if !active {
            Some(SkipReason::Inactive)
        } else if recovering {
            Some(SkipReason::Recovering)
        } else if in_transition {
            Some(SkipReason::InTransition)
        } else if tracked_pid.is_none() {
            Some(SkipReason::NoProcess)
        } else {
            None
        }
    }

    /// Liveness first, then staleness
    pub fn evaluate(&self, observation: &HealthObservation) -> HealthVerdict {
        if !observation.alive {
            return HealthVerdict::ProcessGone { pid: observation.pid };
        }

        match observation.since_last_data {
            Some(silent_for) if silent_for > self.thresholds.stale_data_ceiling => HealthVerdict::Stale { silent_for },
            Some(_) => HealthVerdict::Healthy,
            None if observation.uptime > self.thresholds.startup_grace => {
                HealthVerdict::NoInitialData { uptime: observation.uptime }
            }
            None => HealthVerdict::WarmingUp,
        }
    }

    /// Available ratio when it is under the warning threshold
    pub fn memory_pressure(&self, stats: &MemoryStats) -> Option<f64> {
        let ratio = stats.available_ratio()?;
        (ratio < self.thresholds.low_memory_ratio).then_some(ratio)
    }
}
