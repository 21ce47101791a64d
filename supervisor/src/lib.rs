//! Sweep supervision and recovery engine
//!
//! Owns the lifecycle of a single SDR sweep subprocess: spawning it at the
//! cycler's current frequency, watching it for silent failure, and restarting
//! it within a bounded recovery budget. Hardware custody for every tool on the
//! host goes through the [`ResourceArbiter`].

pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod supervisor;
pub mod traits;

// Re-export commonly used types
pub use config::{RecoveryConfig, SupervisorConfig};
pub use core::{
    with_retry, with_retry_if, with_timeout, Backoff, ErrorTracker, FrequencyCycler, HardwareGuard, HealthMonitor,
    HealthThresholds, HealthVerdict, ResourceArbiter, RetryOptions, SweepCommandConfig, TimeoutError, TimeoutOptions,
};
pub use error::{SpawnFailureKind, SupervisorError, SupervisorResult};
pub use services::{RealHostProbe, RealProcessManager};
pub use supervisor::{RecoveryOutcome, SweepSupervisor, SWEEP_TOOL_NAME};
pub use traits::{EventSink, HostProbe, MemoryStats, ProcessControl, ProcessPattern, SpawnedSweep};
pub use traits::{MockEventSink, MockHostProbe, MockProcessControl};
