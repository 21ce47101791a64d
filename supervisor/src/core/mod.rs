//! Core supervision logic
//!
//! Pure state machines and combinators with no process or host I/O. Timing
//! comes from tokio so everything here is testable under a paused clock.

pub mod arbiter;
pub mod command;
pub mod cycler;
pub mod error_analysis;
pub mod error_tracker;
pub mod guard;
pub mod health;
pub mod retry;
pub mod timeout;

pub use arbiter::{Acquisition, Release, ResourceArbiter};
pub use command::{GainProfile, SweepCommandConfig};
pub use cycler::{switching_time_for, CycleTransition, FrequencyCycler, MAX_CYCLE_TIME};
pub use error_analysis::ErrorKind;
pub use error_tracker::{ErrorTracker, FailureRecord, RecoveryDenied, RecoveryGuard, TrackerLimits};
pub use guard::HardwareGuard;
pub use health::{HealthMonitor, HealthObservation, HealthThresholds, HealthVerdict, SkipReason};
pub use retry::{with_retry, with_retry_if, Backoff, RetryOptions};
pub use timeout::{with_timeout, TimeoutError, TimeoutOptions};
