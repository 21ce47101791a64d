//! Fakes and builders for supervisor tests
//!
//! `FakeProcess` stands in for the sweep subprocess: tests push output
//! through it, kill it behind the supervisor's back, and make spawns fail
//! or stall on demand.

use super::fixtures::TestFixtures;
use async_trait::async_trait;
use chrono::Utc;
use shared::{ErrorCode, ProcessState, SweepEvent};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use supervisor::{
    EventSink, HostProbe, MemoryStats, MockHostProbe, ProcessControl, ProcessPattern, ResourceArbiter, SpawnFailureKind,
    SpawnedSweep, SupervisorConfig, SupervisorError, SupervisorResult, SweepSupervisor,
};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct FakeState {
    next_pid: u32,
    current: Option<u32>,
    alive: bool,
    sender: Option<mpsc::Sender<Vec<u8>>>,
    spawn_args: Vec<Vec<String>>,
    fail_next: u32,
    permanent_failure: bool,
    spawn_delay: Duration,
    kills: u32,
    cleanups: u32,
}

#[derive(Debug, Default)]
struct FakeInner {
    state: Mutex<FakeState>,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

/// Cloneable handle; the supervisor owns one clone, the test keeps another
#[derive(Debug, Clone, Default)]
pub struct FakeProcess {
    inner: Arc<FakeInner>,
}

impl FakeProcess {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.lock().next_pid = TestFixtures::FIRST_PID;
        fake
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.inner.state.lock().unwrap()
    }

    /// Push one chunk of stdout from the running process
    pub async fn emit(&self, data: &str) {
        let sender = self.lock().sender.clone();
        if let Some(sender) = sender {
            sender.send(data.as_bytes().to_vec()).await.unwrap();
        }
    }

    /// Process exits on its own: stdout closes and the pid stops answering
    pub fn exit(&self) {
        let mut state = self.lock();
        state.sender = None;
        state.alive = false;
    }

    /// Process vanishes but its stdout stays open, so only a liveness probe
    /// can notice
    pub fn vanish(&self) {
        self.lock().alive = false;
    }

    pub fn fail_next_spawns(&self, count: u32) {
        self.lock().fail_next = count;
    }

    pub fn fail_permanently(&self) {
        self.lock().permanent_failure = true;
    }

    pub fn set_spawn_delay(&self, delay: Duration) {
        self.lock().spawn_delay = delay;
    }

    pub fn spawn_count(&self) -> usize {
        self.lock().spawn_args.len()
    }

    pub fn spawn_args(&self) -> Vec<Vec<String>> {
        self.lock().spawn_args.clone()
    }

    pub fn kill_count(&self) -> u32 {
        self.lock().kills
    }

    pub fn cleanup_count(&self) -> u32 {
        self.lock().cleanups
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.lock().current
    }

    pub fn max_concurrent_spawns(&self) -> u32 {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessControl for FakeProcess {
    async fn spawn(&self, args: Vec<String>) -> SupervisorResult<SpawnedSweep> {
        let in_flight = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = self.lock().spawn_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.lock();
        state.spawn_args.push(args);
        if state.permanent_failure {
            return Err(SupervisorError::spawn(SpawnFailureKind::BinaryMissing, "hackrf_sweep: not found"));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SupervisorError::spawn(SpawnFailureKind::Other, "hackrf_open() failed: Resource busy"));
        }
        if state.alive && state.current.is_some() {
            return Err(SupervisorError::AlreadyRunning { pid: state.current });
        }

        let pid = state.next_pid;
        state.next_pid += 1;
        let (sender, output) = mpsc::channel(64);
        state.sender = Some(sender);
        state.current = Some(pid);
        state.alive = true;

        Ok(SpawnedSweep {
            state: ProcessState {
                running: true,
                pid: Some(pid),
                process_group_id: Some(pid as i32),
                started_at: Some(Utc::now()),
            },
            output,
        })
    }

    fn state(&self) -> ProcessState {
        let state = self.lock();
        ProcessState {
            running: state.alive && state.current.is_some(),
            pid: state.current,
            process_group_id: state.current.map(|pid| pid as i32),
            started_at: None,
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        let state = self.lock();
        state.alive && state.current == Some(pid)
    }

    async fn force_kill(&self) -> SupervisorResult<()> {
        let mut state = self.lock();
        state.kills += 1;
        state.sender = None;
        state.current = None;
        state.alive = false;
        Ok(())
    }

    async fn cleanup(&self) {
        self.lock().cleanups += 1;
    }
}

/// Event sink that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SweepEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SweepEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(SweepEvent::kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SweepEvent::Error(payload) => Some(payload.code),
                _ => None,
            })
            .collect()
    }

    pub fn status_changes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SweepEvent::StatusChange { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: SweepEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Host probe whose memory sample takes a while, so a health tick yields
/// to other tasks in the middle
#[derive(Debug, Clone)]
pub struct SlowProbe {
    delay: Duration,
}

impl SlowProbe {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl HostProbe for SlowProbe {
    async fn memory_stats(&self) -> SupervisorResult<MemoryStats> {
        tokio::time::sleep(self.delay).await;
        Ok(MemoryStats { total_mb: 8000, available_mb: 4000 })
    }

    async fn find_processes(&self, _pattern: &ProcessPattern) -> SupervisorResult<Vec<u32>> {
        Ok(vec![])
    }
}

/// A supervisor wired to fakes, plus handles on each fake
pub struct SupervisorHarness<H = MockHostProbe> {
    pub supervisor: SweepSupervisor<FakeProcess, H, RecordingSink>,
    pub process: FakeProcess,
    pub events: Arc<RecordingSink>,
    pub arbiter: Arc<ResourceArbiter>,
}

impl SupervisorHarness {
    pub fn new() -> Self {
        Self::with_config(TestFixtures::config())
    }

    pub fn with_config(config: SupervisorConfig) -> Self {
        let mut probe = MockHostProbe::new();
        probe
            .expect_memory_stats()
            .returning(|| Ok(MemoryStats { total_mb: 8000, available_mb: 4000 }))
            .times(0..);
        probe.expect_find_processes().returning(|_| Ok(vec![])).times(0..);

        Self::with_probe(config, probe)
    }
}

impl<H: HostProbe + 'static> SupervisorHarness<H> {
    pub fn with_probe(config: SupervisorConfig, probe: H) -> Self {
        let process = FakeProcess::new();
        let events = Arc::new(RecordingSink::default());
        let arbiter = Arc::new(ResourceArbiter::new());

        let supervisor = SweepSupervisor::new(process.clone(), probe, events.clone(), arbiter.clone(), config);
        Self {
            supervisor,
            process,
            events,
            arbiter,
        }
    }
}

/// Let spawned tasks run without moving the clock much
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
