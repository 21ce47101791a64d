//! Real process management service implementation
//!
//! Spawns the sweep binary as the leader of its own process group so the
//! whole tree can be signalled at once, forwards raw stdout chunks, and reaps
//! the child in a dedicated waiter task.

use async_trait::async_trait;
use chrono::Utc;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::core::command::SweepCommandConfig;
use crate::error::{SpawnFailureKind, SupervisorError, SupervisorResult};
use crate::traits::{HostProbe, ProcessControl, ProcessPattern, SpawnedSweep};
use shared::logging::Component;
use shared::{component_debug, component_error, component_info, component_warn, ProcessState};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Real process manager implementation
pub struct RealProcessManager {
    binary: PathBuf,
    probe: Arc<dyn HostProbe>,
    orphan_patterns: Vec<ProcessPattern>,
    tracked: Mutex<Option<TrackedProcess>>,
    /// Serializes spawn and kill against each other
    lifecycle: tokio::sync::Mutex<()>,
    kill_grace: Duration,
    output_capacity: usize,
}

/// Handle for the managed sweep process
struct TrackedProcess {
    state: ProcessState,
    exited: watch::Receiver<bool>,
    waiter: JoinHandle<()>,
}

impl TrackedProcess {
    fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }
}

impl RealProcessManager {
    /// Create a process manager for the configured sweep binary
    pub fn new(command: &SweepCommandConfig, probe: Arc<dyn HostProbe>) -> Self {
        let mut orphan_patterns = vec![ProcessPattern::Exact("hackrf_sweep".to_string())];
        if let Some(name) = command.binary_name() {
            let own = ProcessPattern::Exact(name);
            if !orphan_patterns.contains(&own) {
                orphan_patterns.push(own);
            }
        }
        orphan_patterns.push(ProcessPattern::CommandLine("hackrf_info".to_string()));

        Self {
            binary: command.binary.clone(),
            probe,
            orphan_patterns,
            tracked: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            kill_grace: Duration::from_millis(1_000),
            output_capacity: 256,
        }
    }

    /// Configure which processes count as orphans (fluent API)
    pub fn with_orphan_patterns(mut self, patterns: Vec<ProcessPattern>) -> Self {
        self.orphan_patterns = patterns;
        self
    }

    /// Configure the SIGTERM → SIGKILL escalation window (fluent API)
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Configure the stdout chunk buffer (fluent API)
    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity.max(1);
        self
    }

    fn tracked(&self) -> MutexGuard<'_, Option<TrackedProcess>> {
        self.tracked.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn live_pid(&self) -> Option<u32> {
        self.tracked()
            .as_ref()
            .filter(|t| !t.has_exited())
            .and_then(|t| t.state.pid)
    }

    fn signal_group(pgid: i32, sig: Signal) -> SupervisorResult<()> {
        match signal::killpg(Pid::from_raw(pgid), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(SupervisorError::Signal { pid: -pgid, errno }),
        }
    }

    async fn wait_exit(exited: &mut watch::Receiver<bool>, within: Duration) -> bool {
        if *exited.borrow() {
            return true;
        }
        matches!(tokio::time::timeout(within, exited.wait_for(|done| *done)).await, Ok(Ok(_)))
    }

    /// Forward stdout, then reap. Runs for the lifetime of the child.
    fn spawn_waiter(
        mut child: Child,
        pid: u32,
        output: mpsc::Sender<Vec<u8>>,
        exited: watch::Sender<bool>,
    ) -> JoinHandle<()> {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    component_debug!(Component::ProcessManager, "sweep[{}] stderr: {}", pid, line);
                }
            });
        }

        tokio::spawn(async move {
            if let Some(mut stdout) = stdout {
                let mut buf = vec![0u8; READ_CHUNK_BYTES];
                let mut forwarding = true;
                loop {
                    match stdout.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            // Keep draining after the consumer goes away so the
                            // child never blocks on a full pipe
                            if forwarding && output.send(buf[..n].to_vec()).await.is_err() {
                                forwarding = false;
                            }
                        }
                        Err(e) => {
                            component_warn!(Component::ProcessManager, "⚠️ sweep[{}] stdout read failed: {}", pid, e);
                            break;
                        }
                    }
                }
            }
            drop(output);

            match child.wait().await {
                Ok(status) => component_info!(Component::ProcessManager, "🏁 sweep[{}] exited: {}", pid, status),
                Err(e) => component_error!(Component::ProcessManager, "❌ Failed to reap sweep[{}]: {}", pid, e),
            }
            let _ = exited.send(true);
        })
    }
}

#[async_trait]
impl ProcessControl for RealProcessManager {
    async fn spawn(&self, args: Vec<String>) -> SupervisorResult<SpawnedSweep> {
        let _lifecycle = self.lifecycle.lock().await;

        if let Some(pid) = self.live_pid() {
            return Err(SupervisorError::AlreadyRunning { pid: Some(pid) });
        }

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let child = cmd.spawn().map_err(|e| {
            SupervisorError::spawn(SpawnFailureKind::from_io(&e), format!("{}: {e}", self.binary.display()))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::spawn(SpawnFailureKind::Other, "process exited before its pid was read"))?;

        let state = ProcessState {
            running: true,
            pid: Some(pid),
            // process_group(0) makes the child its own group leader
            process_group_id: Some(pid as i32),
            started_at: Some(Utc::now()),
        };

        let (output_tx, output_rx) = mpsc::channel(self.output_capacity);
        let (exited_tx, exited_rx) = watch::channel(false);
        let waiter = Self::spawn_waiter(child, pid, output_tx, exited_tx);

        *self.tracked() = Some(TrackedProcess {
            state: state.clone(),
            exited: exited_rx,
            waiter,
        });

        component_info!(
            Component::ProcessManager,
            "🚀 Spawned {} (PID: {}) args: {}",
            self.binary.display(),
            pid,
            args.join(" ")
        );

        Ok(SpawnedSweep {
            state,
            output: output_rx,
        })
    }

    fn state(&self) -> ProcessState {
        match self.tracked().as_ref() {
            Some(tracked) => ProcessState {
                running: !tracked.has_exited(),
                ..tracked.state.clone()
            },
            None => ProcessState::stopped(),
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        if let Some(tracked) = self.tracked().as_ref() {
            if tracked.state.pid == Some(pid) {
                return !tracked.has_exited();
            }
        }

        match signal::kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            // Exists but belongs to someone else
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    async fn force_kill(&self) -> SupervisorResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let target = self
            .tracked()
            .as_ref()
            .map(|t| (t.state.pid.unwrap_or_default(), t.state.process_group_id, t.exited.clone()));
        let Some((pid, pgid, mut exited)) = target else {
            return Ok(());
        };
        let pgid = pgid.unwrap_or(pid as i32);

        if !*exited.borrow() {
            Self::signal_group(pgid, Signal::SIGTERM)?;
            component_debug!(Component::ProcessManager, "📤 Sent SIGTERM to group {}", pgid);

            if !Self::wait_exit(&mut exited, self.kill_grace).await {
                component_warn!(
                    Component::ProcessManager,
                    "🔨 sweep[{}] ignored SIGTERM, using SIGKILL",
                    pid
                );
                Self::signal_group(pgid, Signal::SIGKILL)?;
                if !Self::wait_exit(&mut exited, self.kill_grace).await {
                    return Err(SupervisorError::KillUnconfirmed { pid });
                }
            }
        }

        // Stragglers that outlived the leader
        Self::signal_group(pgid, Signal::SIGKILL)?;

        if let Some(tracked) = self.tracked().take() {
            tracked.waiter.abort();
        }
        component_info!(Component::ProcessManager, "🛑 sweep[{}] terminated", pid);
        Ok(())
    }

    async fn cleanup(&self) {
        let (tracked_pid, tracked_pgid) = self
            .tracked()
            .as_ref()
            .map(|t| (t.state.pid, t.state.process_group_id))
            .unwrap_or((None, None));
        let own_pid = std::process::id();
        let mut killed = 0usize;

        for pattern in &self.orphan_patterns {
            let pids = match self.probe.find_processes(pattern).await {
                Ok(pids) => pids,
                Err(e) => {
                    component_warn!(Component::ProcessManager, "⚠️ Orphan scan for {:?} failed: {}", pattern, e);
                    continue;
                }
            };

            for pid in pids {
                if pid == own_pid || Some(pid) == tracked_pid {
                    continue;
                }
                let raw = Pid::from_raw(pid as i32);
                if let (Some(group), Ok(pgid)) = (tracked_pgid, nix::unistd::getpgid(Some(raw))) {
                    if pgid.as_raw() == group {
                        continue;
                    }
                }

                match signal::kill(raw, Signal::SIGKILL) {
                    Ok(()) => {
                        killed += 1;
                        component_debug!(Component::ProcessManager, "🔪 Killed orphan {} ({:?})", pid, pattern);
                    }
                    Err(Errno::ESRCH) => {}
                    Err(e) => component_warn!(Component::ProcessManager, "⚠️ Failed to kill orphan {}: {}", pid, e),
                }
            }
        }

        if killed > 0 {
            component_info!(Component::ProcessManager, "🧹 Cleaned up {} orphaned processes", killed);
        }
    }
}
