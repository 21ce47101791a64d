//! Failure bookkeeping and the single in-flight recovery guard
//!
//! Besides the recovery budget this keeps the failure history the
//! supervisor acts on: a one-minute failure window, error counts per
//! frequency range, and the device condition inferred from error text.

use chrono::{DateTime, Utc};
use shared::logging::Component;
use shared::{component_debug, DeviceStatus, FrequencyRange, RecoveryStatus};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::core::error_analysis::ErrorKind;

pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_FAILURES_PER_MINUTE: u32 = 5;
pub const DEFAULT_BLACKLIST_THRESHOLD: u32 = 3;
pub const DEFAULT_RECOVERY_COOLDOWN: Duration = Duration::from_millis(2_000);

const FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Why a recovery could not start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDenied {
    /// Another recovery holds the guard
    InProgress,
    /// The attempt ceiling has been reached
    Exhausted,
    /// The previous recovery finished too recently
    CoolingDown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerLimits {
    pub max_attempts: u32,
    /// Failures inside one minute that make recovery pointless
    pub max_failures_per_minute: u32,
    /// Errors on one range before it is dropped from the cycle
    pub blacklist_threshold: u32,
    /// Quiet period after a recovery ends before the next may start
    pub cooldown: Duration,
}

impl Default for TrackerLimits {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            max_failures_per_minute: DEFAULT_MAX_FAILURES_PER_MINUTE,
            blacklist_threshold: DEFAULT_BLACKLIST_THRESHOLD,
            cooldown: DEFAULT_RECOVERY_COOLDOWN,
        }
    }
}

/// What the tracker made of one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    pub kind: ErrorKind,
    /// Errors charged to the range so far, zero when no range was given
    pub frequency_errors: u32,
    pub recent_failures: u32,
    pub device_status: DeviceStatus,
}

#[derive(Debug, Default)]
struct TrackerInner {
    attempts: u32,
    last_attempt_at: Option<DateTime<Utc>>,
    is_recovering: bool,
    last_error: Option<String>,
    consecutive: u32,
    recent: VecDeque<Instant>,
    frequency_errors: Vec<(FrequencyRange, u32)>,
    device_status: DeviceStatus,
    cooldown_until: Option<Instant>,
}

impl TrackerInner {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.recent.front() {
            if now.duration_since(*oldest) < FAILURE_WINDOW {
                break;
            }
            self.recent.pop_front();
        }
    }

    fn errors_for(&self, range: &FrequencyRange) -> u32 {
        self.frequency_errors
            .iter()
            .find(|(r, _)| r == range)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    fn note(&mut self, message: &str, range: Option<FrequencyRange>) -> FailureRecord {
        let now = Instant::now();
        self.prune(now);
        self.recent.push_back(now);
        self.consecutive = self.consecutive.saturating_add(1);

        let kind = ErrorKind::classify(message);
        if let Some(status) = kind.device_status(self.consecutive) {
            self.device_status = status;
        }

        let frequency_errors = match range {
            Some(range) => match self.frequency_errors.iter_mut().find(|(r, _)| *r == range) {
                Some((_, count)) => {
                    *count = count.saturating_add(1);
                    *count
                }
                None => {
                    self.frequency_errors.push((range, 1));
                    1
                }
            },
            None => 0,
        };

        FailureRecord {
            kind,
            frequency_errors,
            recent_failures: self.recent.len() as u32,
            device_status: self.device_status,
        }
    }
}

#[derive(Debug)]
pub struct ErrorTracker {
    limits: TrackerLimits,
    inner: Mutex<TrackerInner>,
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::with_limits(TrackerLimits::default())
    }
}

impl ErrorTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self::with_limits(TrackerLimits {
            max_attempts,
            ..TrackerLimits::default()
        })
    }

    pub fn with_limits(limits: TrackerLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(TrackerInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn max_attempts(&self) -> u32 {
        self.limits.max_attempts
    }

    pub fn limits(&self) -> &TrackerLimits {
        &self.limits
    }

    /// Note a failure against `range` without spending recovery budget
    pub fn record_failure(&self, message: &str, range: Option<FrequencyRange>) -> FailureRecord {
        let mut inner = self.lock();
        let record = inner.note(message, range);
        inner.last_error = Some(message.to_string());
        component_debug!(
            Component::Recovery,
            "📉 Failure {:?} ({} in the last minute): {}",
            record.kind,
            record.recent_failures,
            message
        );
        record
    }

    /// Count a failed restart against the budget. Never triggers anything on
    /// its own.
    pub fn record_error(&self, error: &dyn std::fmt::Display, context: &str, range: Option<FrequencyRange>) -> u32 {
        let message = format!("{context}: {error}");
        let mut inner = self.lock();
        inner.note(&message, range);
        inner.attempts = inner.attempts.saturating_add(1);
        inner.last_error = Some(message);
        component_debug!(
            Component::Recovery,
            "📉 Recorded error {}/{} in {}: {}",
            inner.attempts,
            self.limits.max_attempts,
            context,
            error
        );
        inner.attempts
    }

    /// Confirmed restart: clear the counter and the recovering flag
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.attempts = 0;
        inner.consecutive = 0;
        inner.is_recovering = false;
        inner.last_error = None;
        inner.device_status = DeviceStatus::Available;
    }

    pub fn should_attempt_recovery(&self) -> bool {
        let inner = self.lock();
        inner.attempts < self.limits.max_attempts && !inner.is_recovering
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock().attempts >= self.limits.max_attempts
    }

    pub fn is_recovering(&self) -> bool {
        self.lock().is_recovering
    }

    pub fn is_cooling_down(&self) -> bool {
        self.lock().cooldown_until.is_some_and(|until| Instant::now() < until)
    }

    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn device_status(&self) -> DeviceStatus {
        self.lock().device_status
    }

    pub fn recent_failures(&self) -> u32 {
        let mut inner = self.lock();
        inner.prune(Instant::now());
        inner.recent.len() as u32
    }

    pub fn has_max_failures_per_minute(&self) -> bool {
        self.recent_failures() >= self.limits.max_failures_per_minute
    }

    pub fn frequency_errors(&self, range: &FrequencyRange) -> u32 {
        self.lock().errors_for(range)
    }

    pub fn should_blacklist(&self, range: &FrequencyRange) -> bool {
        self.frequency_errors(range) >= self.limits.blacklist_threshold
    }

    /// The range with the most errors charged to it
    pub fn most_problematic_frequency(&self) -> Option<(FrequencyRange, u32)> {
        self.lock()
            .frequency_errors
            .iter()
            .copied()
            .max_by_key(|(_, count)| *count)
    }

    pub fn reset_frequency_errors(&self) {
        self.lock().frequency_errors.clear();
    }

    /// Set the recovering flag if no recovery is running, budget remains and
    /// the cooldown has passed.
    ///
    /// The check and the set happen under one lock, so of two concurrent
    /// callers exactly one gets a guard. The flag is cleared when the guard
    /// drops.
    pub fn begin_recovery(&self) -> Result<RecoveryGuard<'_>, RecoveryDenied> {
        let mut inner = self.lock();
        if inner.is_recovering {
            return Err(RecoveryDenied::InProgress);
        }
        if inner.attempts >= self.limits.max_attempts {
            return Err(RecoveryDenied::Exhausted);
        }
        if inner.cooldown_until.is_some_and(|until| Instant::now() < until) {
            return Err(RecoveryDenied::CoolingDown);
        }
        inner.is_recovering = true;
        inner.last_attempt_at = Some(Utc::now());
        Ok(RecoveryGuard {
            tracker: self,
            cooldown: true,
        })
    }

    fn end_recovery(&self, cooldown: bool) {
        let mut inner = self.lock();
        inner.is_recovering = false;
        if cooldown && !self.limits.cooldown.is_zero() {
            inner.cooldown_until = Some(Instant::now() + self.limits.cooldown);
        }
    }

    /// Operator reset: forget all failures
    pub fn reset(&self) {
        *self.lock() = TrackerInner::default();
    }

    pub fn status(&self) -> RecoveryStatus {
        let mut inner = self.lock();
        inner.prune(Instant::now());
        RecoveryStatus {
            attempts: inner.attempts,
            max_attempts: self.limits.max_attempts,
            last_attempt_at: inner.last_attempt_at,
            is_recovering: inner.is_recovering,
            device_status: inner.device_status,
            recent_failures: inner.recent.len() as u32,
        }
    }
}

/// Holds the single recovery slot; clears `is_recovering` on drop and
/// starts the cooldown
#[derive(Debug)]
pub struct RecoveryGuard<'a> {
    tracker: &'a ErrorTracker,
    cooldown: bool,
}

impl RecoveryGuard<'_> {
    /// One-based number of the attempt about to run
    pub fn attempt(&self) -> u32 {
        self.tracker.attempts() + 1
    }

    pub fn remaining(&self) -> u32 {
        self.tracker.limits.max_attempts.saturating_sub(self.tracker.attempts())
    }

    /// Give the slot back for a recovery that never ran; no cooldown follows
    pub fn cancel(mut self) {
        self.cooldown = false;
    }
}

impl Drop for RecoveryGuard<'_> {
    fn drop(&mut self) {
        self.tracker.end_recovery(self.cooldown);
    }
}
