//! Trait definitions with mockall annotations for testing
//!
//! These are the seams between supervision logic and the host: the sweep
//! subprocess, host introspection, and the event fan-out. Production
//! implementations live in `services` (and the broadcaster in the web crate).

use crate::error::SupervisorResult;
use shared::{ProcessState, SweepEvent};
use tokio::sync::mpsc;

/// A freshly spawned sweep and its raw stdout stream.
///
/// The receiver closes when the process closes its stdout, which in practice
/// means it exited.
#[derive(Debug)]
pub struct SpawnedSweep {
    pub state: ProcessState,
    pub output: mpsc::Receiver<Vec<u8>>,
}

/// Host memory snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_mb: u64,
    pub available_mb: u64,
}

impl MemoryStats {
    pub fn available_ratio(&self) -> Option<f64> {
        (self.total_mb > 0).then(|| self.available_mb as f64 / self.total_mb as f64)
    }
}

/// How to match processes in a host scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessPattern {
    /// Exact process name
    Exact(String),
    /// Substring of the full command line
    CommandLine(String),
}

/// Lifecycle control of the single sweep subprocess
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessControl: Send + Sync {
    /// Start the sweep binary with `args`.
    ///
    /// Fails with `AlreadyRunning` while a live process is tracked.
    async fn spawn(&self, args: Vec<String>) -> SupervisorResult<SpawnedSweep>;

    /// Current snapshot, never blocks
    fn state(&self) -> ProcessState;

    /// Signal-0 style probe; a dead or unknown pid is `false`, never an error
    fn is_alive(&self, pid: u32) -> bool;

    /// Terminate the tracked process group. Idempotent.
    async fn force_kill(&self) -> SupervisorResult<()>;

    /// Kill orphaned sweep binaries and helpers that are not the tracked
    /// process. Best effort: failures are logged, never returned.
    async fn cleanup(&self);
}

/// Narrow host introspection, parsed into fixed structs
#[mockall::automock]
#[async_trait::async_trait]
pub trait HostProbe: Send + Sync {
    async fn memory_stats(&self) -> SupervisorResult<MemoryStats>;

    /// Pids matching `pattern`; an empty list when nothing matches
    async fn find_processes(&self, pattern: &ProcessPattern) -> SupervisorResult<Vec<u32>>;
}

/// Non-blocking event fan-out.
///
/// `publish` must return immediately regardless of how slow any consumer is.
#[mockall::automock]
pub trait EventSink: Send + Sync {
    fn publish(&self, event: SweepEvent);
}
