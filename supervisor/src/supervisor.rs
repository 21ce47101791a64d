//! Sweep supervisor: the context object that ties the components together
//!
//! One instance per physical sweep device, constructed once at startup and
//! shared by handle. It owns the process control service, the cycler, the
//! error tracker and the health monitor, and runs three kinds of independent
//! tasks per session: the health tick, the frequency cycle, and an output
//! pump per spawned process. They coordinate only through the mutex-guarded
//! state below and a session shutdown signal.

use chrono::{DateTime, Utc};
use shared::logging::Component;
use shared::{
    component_debug, component_error, component_info, component_warn, CycleConfigPayload, CycleState, ErrorCode,
    FrequencyRange, HardwareDevice, HealthSnapshot, ProcessHealth, RecoveryPayload, RecoveryStatus, SpectrumFrame,
    StartupPhase, StatusPayload, SweepEvent,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::config::SupervisorConfig;
use crate::core::cycler::{CycleTransition, MAX_CYCLE_TIME};
use crate::core::error_tracker::RecoveryDenied;
use crate::core::health::{HealthObservation, SkipReason};
use crate::core::retry::{with_retry_if, RetryOptions};
use crate::core::timeout::{with_timeout, TimeoutOptions};
use crate::core::{ErrorTracker, FrequencyCycler, HardwareGuard, HealthMonitor, HealthVerdict, ResourceArbiter};
use crate::error::{SpawnFailureKind, SupervisorError, SupervisorResult};
use crate::traits::{EventSink, HostProbe, ProcessControl};

/// Name the sweep holds its hardware lock under
pub const SWEEP_TOOL_NAME: &str = "hackrf-sweep";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered { pid: u32 },
    /// Another recovery is in flight or cooling down, supervision is not
    /// active, or the failure was about a process that is already gone
    Skipped,
    /// The ceiling was reached and supervision was stopped
    Exhausted,
    /// A permanent spawn error ended the session
    Fatal { message: String },
    /// Supervision stopped while the recovery was running
    Aborted,
}

/// Everything a session owns that must go away when it stops
#[derive(Default)]
struct Session {
    shutdown: Option<watch::Sender<bool>>,
    hardware: Option<HardwareGuard>,
    pump: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Why a sweep process is being spawned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpawnReason {
    Start,
    /// Deliberate move to another range; the data clock keeps running
    Switch,
    Recovery,
}

/// Data arrival bookkeeping for the health monitor.
///
/// Runs for the whole session and restarts only on start and on a recovery
/// restart, so a device that goes quiet while cycling is still caught.
#[derive(Debug, Default)]
struct DataClock {
    spawned_at: Option<Instant>,
    last_data: Option<Instant>,
    last_data_wall: Option<DateTime<Utc>>,
    health: Option<ProcessHealth>,
    phase: StartupPhase,
}

struct Inner<P, H, E> {
    process: P,
    probe: H,
    events: Arc<E>,
    arbiter: Arc<ResourceArbiter>,
    cycler: FrequencyCycler,
    tracker: ErrorTracker,
    monitor: HealthMonitor,
    config: SupervisorConfig,
    active: AtomicBool,
    /// Bumped on every start and stop; work from an older session is void
    epoch: AtomicU64,
    /// Bumped on every spawn and deliberate kill; stale pumps ignore EOF
    generation: AtomicU64,
    /// Serializes start, stop, frequency switches and recovery restarts
    control: tokio::sync::Mutex<()>,
    session: Mutex<Session>,
    clock: Mutex<DataClock>,
}

impl<P, H, E> Inner<P, H, E>
where
    E: EventSink,
{
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn clock(&self) -> MutexGuard<'_, DataClock> {
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SweepEvent) {
        self.events.publish(event);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.active.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn shutdown_receiver(&self) -> Option<watch::Receiver<bool>> {
        self.session().shutdown.as_ref().map(|tx| tx.subscribe())
    }

    fn restart_clock(&self) {
        let mut clock = self.clock();
        clock.spawned_at = Some(Instant::now());
        clock.last_data = None;
        clock.phase = StartupPhase::Starting;
    }

    fn record_data(&self) {
        let mut clock = self.clock();
        clock.last_data = Some(Instant::now());
        clock.last_data_wall = Some(Utc::now());
        if clock.phase == StartupPhase::Starting {
            clock.phase = StartupPhase::Streaming;
        }
    }

    fn set_health(&self, health: Option<ProcessHealth>, phase: Option<StartupPhase>) {
        let mut clock = self.clock();
        clock.health = health;
        if let Some(phase) = phase {
            clock.phase = phase;
        }
    }

    fn reset_clock(&self) {
        *self.clock() = DataClock::default();
    }

    fn recovery_payload(&self, attempt: u32, reason: &str) -> RecoveryPayload {
        RecoveryPayload {
            attempt,
            max_attempts: self.tracker.max_attempts(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

pub struct SweepSupervisor<P, H, E> {
    inner: Arc<Inner<P, H, E>>,
}

impl<P, H, E> Clone for SweepSupervisor<P, H, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P, H, E> SweepSupervisor<P, H, E>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
    E: EventSink + 'static,
{
    pub fn new(process: P, probe: H, events: Arc<E>, arbiter: Arc<ResourceArbiter>, config: SupervisorConfig) -> Self {
        let tracker = ErrorTracker::with_limits(config.recovery.tracker_limits());
        let monitor = HealthMonitor::new(config.health.clone());
        Self {
            inner: Arc::new(Inner {
                process,
                probe,
                events,
                arbiter,
                cycler: FrequencyCycler::new(),
                tracker,
                monitor,
                config,
                active: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                control: tokio::sync::Mutex::new(()),
                session: Mutex::new(Session::default()),
                clock: Mutex::new(DataClock::default()),
            }),
        }
    }

    pub fn arbiter(&self) -> &Arc<ResourceArbiter> {
        &self.inner.arbiter
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn cycle_state(&self) -> CycleState {
        self.inner.cycler.state()
    }

    pub fn cycle_config(&self) -> CycleConfigPayload {
        self.inner.cycler.config_payload()
    }

    pub fn recovery_status(&self) -> RecoveryStatus {
        self.inner.tracker.status()
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        let clock = self.inner.clock();
        HealthSnapshot {
            process_health: clock.health,
            last_data_received_at: clock.last_data_wall,
            process_startup_phase: clock.phase,
        }
    }

    pub fn status(&self) -> StatusPayload {
        StatusPayload {
            active: self.is_active(),
            process: self.inner.process.state(),
            cycle: self.inner.cycler.state(),
            recovery: self.inner.tracker.status(),
            health: self.health_snapshot(),
            timestamp: Utc::now(),
        }
    }

    fn emit_status(&self) {
        self.inner.emit(SweepEvent::Status(self.status()));
    }

    /// Begin supervising a sweep over `frequencies`.
    ///
    /// Takes the sweep's hardware lock, clears orphans left by an earlier run,
    /// spawns at the first range and starts the health and cycle tasks. A
    /// spawn failure here ends the session immediately.
    pub async fn start(
        &self,
        frequencies: Vec<FrequencyRange>,
        cycle_time: Option<Duration>,
    ) -> SupervisorResult<StatusPayload> {
        let inner = &self.inner;
        if frequencies.is_empty() {
            return Err(SupervisorError::NoFrequencies);
        }
        let cycle_time = cycle_time.unwrap_or(inner.config.default_cycle_time);
        check_dwell("cycle_time", cycle_time)?;

        let control = inner.control.lock().await;
        if inner.active.load(Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyRunning {
                pid: inner.process.state().pid,
            });
        }

        let hardware = match HardwareGuard::acquire(inner.arbiter.clone(), SWEEP_TOOL_NAME, HardwareDevice::HackRf) {
            Ok(guard) => guard,
            Err(e) => {
                component_warn!(Component::Supervisor, "⛔ Cannot start sweep: {}", e);
                inner.emit(SweepEvent::error(e.code(), e.to_string()));
                return Err(e);
            }
        };

        inner.process.cleanup().await;

        inner.cycler.configure(frequencies, cycle_time, inner.config.switching_time);
        inner.tracker.reset();
        inner.reset_clock();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut session = inner.session();
            session.shutdown = Some(shutdown_tx);
            session.hardware = Some(hardware);
        }
        inner.active.store(true, Ordering::SeqCst);

        let first = inner.cycler.current().ok_or(SupervisorError::NoFrequencies);
        let spawned = match first {
            Ok(range) => self.spawn_sweep(range, epoch, SpawnReason::Start).await,
            Err(e) => Err(e),
        };
        if let Err(e) = spawned {
            component_error!(Component::Supervisor, "❌ Sweep failed to start: {}", e);
            inner.active.store(false, Ordering::SeqCst);
            inner.epoch.fetch_add(1, Ordering::SeqCst);
            // A spawn that outran its deadline may still have landed
            let _ = inner.process.force_kill().await;
            inner.cycler.clear();
            inner.reset_clock();
            let session = std::mem::take(&mut *inner.session());
            drop(session);
            drop(control);
            inner.emit(SweepEvent::error(e.code(), e.to_string()));
            inner.emit(SweepEvent::status_change("error", Some(e.to_string())));
            return Err(e);
        }

        let mut tasks = Vec::new();
        {
            let supervisor = self.clone();
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move { supervisor.health_loop(shutdown).await }));
        }
        if inner.cycler.is_cycling() {
            let supervisor = self.clone();
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move { supervisor.cycle_loop(shutdown).await }));
        }
        inner.session().tasks = tasks;
        drop(control);

        let state = inner.cycler.state();
        component_info!(
            Component::Supervisor,
            "🚀 Sweep supervision started on {} ({} ranges, cycling: {})",
            state.current_frequency.map(|r| r.to_string()).unwrap_or_default(),
            inner.cycler.frequencies().len(),
            state.is_cycling
        );
        inner.emit(SweepEvent::status_change("started", None));
        inner.emit(SweepEvent::CycleConfig(inner.cycler.config_payload()));
        let status = self.status();
        inner.emit(SweepEvent::Status(status.clone()));
        Ok(status)
    }

    /// Stop supervision. Idempotent.
    pub async fn stop(&self) -> SupervisorResult<StatusPayload> {
        if !self.is_active() && self.inner.process.state().pid.is_none() {
            return Ok(self.status());
        }
        self.shutdown_session("stopped", false).await?;
        Ok(self.status())
    }

    /// Kill everything regardless of cycle or recovery state and forget all
    /// failures
    pub async fn emergency_stop(&self) -> SupervisorResult<StatusPayload> {
        component_warn!(Component::Supervisor, "🚨 Emergency stop requested");
        self.shutdown_session("emergency_stopped", true).await?;
        Ok(self.status())
    }

    /// Operator override for a device lock. Returns the previous owner.
    ///
    /// When the sweep itself holds the HackRF the session is emergency
    /// stopped first, so the radio is free before anyone else can take it.
    pub async fn force_release(&self, device: HardwareDevice) -> SupervisorResult<Option<String>> {
        let previous = self.inner.arbiter.owner(device);
        let sweep_holds = previous.as_deref() == Some(SWEEP_TOOL_NAME);
        if device == HardwareDevice::HackRf && (sweep_holds || self.is_active()) {
            component_warn!(Component::Supervisor, "🔨 Force release of {} stops the sweep", device);
            self.emergency_stop().await?;
        }
        // Anything still recorded (another tool, or a lock the sweep never
        // gave back) goes now
        self.inner.arbiter.force_release(device);
        Ok(previous)
    }

    async fn shutdown_session(&self, status: &str, reset_tracking: bool) -> SupervisorResult<()> {
        let inner = &self.inner;
        inner.active.store(false, Ordering::SeqCst);
        inner.epoch.fetch_add(1, Ordering::SeqCst);

        let session = std::mem::take(&mut *inner.session());
        if let Some(shutdown) = &session.shutdown {
            let _ = shutdown.send(true);
        }

        let kill_result = {
            let _control = inner.control.lock().await;
            inner.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(pump) = &session.pump {
                pump.abort();
            }
            let result = inner.process.force_kill().await;
            inner.process.cleanup().await;
            inner.cycler.clear();
            inner.reset_clock();
            if reset_tracking {
                inner.tracker.reset();
            }
            result
        };

        // Periodic tasks exit on the shutdown signal; dropping the handles
        // detaches them. The hardware guard releases the device.
        drop(session);

        if let Err(e) = &kill_result {
            component_error!(Component::Supervisor, "❌ Failed to terminate sweep: {}", e);
        }
        component_info!(Component::Supervisor, "🛑 Sweep supervision ended: {}", status);
        inner.emit(SweepEvent::status_change(status, None));
        self.emit_status();
        kill_result
    }

    /// Spawn at `range`, bounded by the spawn timeout, and attach a pump.
    ///
    /// A spawn that completes after the deadline or after the session moved
    /// on is killed instead of adopted.
    async fn spawn_sweep(&self, range: FrequencyRange, epoch: u64, reason: SpawnReason) -> SupervisorResult<u32> {
        let inner = &self.inner;
        let args = inner.config.command.build_args(&range);
        let abandoned = Arc::new(AtomicBool::new(false));

        let operation = {
            let inner = inner.clone();
            let abandoned = abandoned.clone();
            async move {
                let result = inner.process.spawn(args).await;
                if result.is_ok() && (abandoned.load(Ordering::SeqCst) || !inner.is_current(epoch)) {
                    component_warn!(Component::Supervisor, "⏰ Late spawn landed after it was abandoned, killing it");
                    let _ = inner.process.force_kill().await;
                    return Err(SupervisorError::NotSupervising);
                }
                result
            }
        };

        let options = TimeoutOptions::new(inner.config.recovery.spawn_timeout)
            .with_message(format!("Sweep spawn timed out after {}ms", inner.config.recovery.spawn_timeout.as_millis()));
        let spawned = match with_timeout(operation, &options).await {
            Ok(result) => result?,
            Err(timeout) => {
                abandoned.store(true, Ordering::SeqCst);
                return Err(timeout.into());
            }
        };

        let pid = spawned.state.pid.unwrap_or_default();
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if reason != SpawnReason::Switch {
            inner.restart_clock();
        }
        self.install_pump(spawned.output, generation, epoch);
        component_info!(Component::Supervisor, "📡 Sweeping {} (PID: {})", range, pid);
        Ok(pid)
    }

    fn install_pump(&self, output: mpsc::Receiver<Vec<u8>>, generation: u64, epoch: u64) {
        let supervisor = self.clone();
        let handle = tokio::spawn(async move { supervisor.pump(output, generation, epoch).await });
        if let Some(previous) = self.inner.session().pump.replace(handle) {
            previous.abort();
        }
    }

    /// Forward raw output as spectrum frames; on unexpected EOF hand the
    /// failure to the recovery controller without waiting for a health tick
    async fn pump(&self, mut output: mpsc::Receiver<Vec<u8>>, generation: u64, epoch: u64) {
        let inner = &self.inner;
        while let Some(chunk) = output.recv().await {
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            inner.record_data();
            inner.emit(SweepEvent::SpectrumData(SpectrumFrame {
                data: String::from_utf8_lossy(&chunk).into_owned(),
                frequency: inner.cycler.current(),
                received_at: Utc::now(),
            }));
        }

        if !inner.is_current(epoch)
            || inner.generation.load(Ordering::SeqCst) != generation
            || inner.cycler.in_transition()
        {
            return;
        }

        component_warn!(Component::Supervisor, "💥 Sweep process exited unexpectedly");
        inner.set_health(Some(ProcessHealth::Unhealthy), None);
        inner.emit(SweepEvent::error(ErrorCode::ProcessDied, "Sweep process exited unexpectedly"));

        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.recover_from("process_died", Some(generation)).await;
        });
    }

    /// Sleep unless the session ends first. Returns whether the session is
    /// still the same one.
    async fn pause(&self, duration: Duration, epoch: u64) -> bool {
        let Some(mut shutdown) = self.inner.shutdown_receiver() else {
            return false;
        };
        tokio::select! {
            _ = sleep(duration) => self.inner.is_current(epoch),
            _ = stopped(&mut shutdown) => false,
        }
    }

    async fn health_loop(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.inner.config.health_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                _ = ticker.tick() => {
                    let verdict = self.health_tick().await;
                    component_debug!(Component::Health, "🩺 Health tick: {:?}", verdict);
                }
            }
        }
    }

    async fn cycle_loop(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let dwell = self.inner.cycler.cycle_time();
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                _ = sleep(dwell) => {
                    if let Err(e) = self.advance_frequency().await {
                        component_debug!(Component::Cycler, "Frequency switch skipped: {}", e);
                    }
                }
            }
        }
    }

    /// One health tick: gate, sample memory, probe liveness, judge staleness
    /// and hand failures to the recovery controller
    pub async fn health_tick(&self) -> HealthVerdict {
        let inner = &self.inner;
        let generation = inner.generation.load(Ordering::SeqCst);
        let state = inner.process.state();
        let skip = inner.monitor.skip_reason(
            inner.active.load(Ordering::SeqCst),
            state.pid,
            inner.tracker.is_recovering(),
            inner.cycler.in_transition(),
        );
        let pid = match (skip, state.pid) {
            (None, Some(pid)) => pid,
            (Some(reason), _) => return HealthVerdict::Skipped(reason),
            (None, None) => return HealthVerdict::Skipped(SkipReason::NoProcess),
        };

        self.sample_memory().await;

        let alive = inner.process.is_alive(pid);
        let observation = {
            let clock = inner.clock();
            let now = Instant::now();
            HealthObservation {
                pid,
                alive,
                uptime: clock.spawned_at.map(|t| now - t).unwrap_or_default(),
                since_last_data: clock.last_data.map(|t| now - t),
            }
        };
        let verdict = inner.monitor.evaluate(&observation);

        // A switch or restart during the memory sample kills the pid on
        // purpose; what was observed no longer describes the sweep
        if inner.generation.load(Ordering::SeqCst) != generation || inner.cycler.in_transition() {
            component_debug!(Component::Health, "Process replaced during health tick, discarding {:?}", verdict);
            return HealthVerdict::Skipped(SkipReason::Superseded);
        }

        match &verdict {
            v if v.is_failure() => {
                let reason = v.reason();
                component_warn!(Component::Health, "🩺 Health check failed: {}", reason);
                inner.set_health(Some(ProcessHealth::Unhealthy), None);
                let code = match v {
                    HealthVerdict::ProcessGone { .. } => ErrorCode::ProcessDied,
                    _ => ErrorCode::HealthCheckFailed,
                };
                inner.emit(SweepEvent::error(code, reason.clone()));
                self.recover_from(&reason, Some(generation)).await;
            }
            HealthVerdict::Healthy => inner.set_health(Some(ProcessHealth::Healthy), Some(StartupPhase::Streaming)),
            _ => {}
        }
        verdict
    }

    async fn sample_memory(&self) {
        let inner = self.inner.clone();
        let options = TimeoutOptions::new(self.inner.config.probe_timeout);
        match with_timeout(async move { inner.probe.memory_stats().await }, &options).await {
            Ok(Ok(stats)) => {
                if let Some(ratio) = self.inner.monitor.memory_pressure(&stats) {
                    component_warn!(
                        Component::Health,
                        "⚠️ Low memory: {}MB of {}MB available ({:.1}%)",
                        stats.available_mb,
                        stats.total_mb,
                        ratio * 100.0
                    );
                }
            }
            Ok(Err(e)) => component_debug!(Component::Health, "Memory probe failed: {}", e),
            Err(e) => component_debug!(Component::Health, "Memory probe: {}", e),
        }
    }

    /// Advance to the next range: kill, wait the switching time, respawn.
    ///
    /// The cycler stays in transition for the whole switch. Skipped while a
    /// recovery holds the slot. A failed respawn is handed to recovery.
    pub async fn advance_frequency(&self) -> SupervisorResult<CycleState> {
        self.switch_frequency(FrequencyCycler::begin_transition).await
    }

    /// Jump straight to entry `index` of the configured list, the same way a
    /// scheduled switch does. Asking for the current entry changes nothing.
    pub async fn skip_to_frequency(&self, index: usize) -> SupervisorResult<CycleState> {
        let frequencies = self.inner.cycler.frequencies();
        match frequencies.get(index) {
            None => return Err(SupervisorError::config("frequency index", index)),
            Some(range) if self.inner.cycler.is_blacklisted(range) => {
                return Err(SupervisorError::config("frequency index", format!("{index} (blacklisted)")));
            }
            Some(_) => {}
        }
        self.switch_frequency(|cycler| cycler.skip_to(index)).await
    }

    /// Change the dwell and switching pause of the running session
    pub fn update_timing(
        &self,
        cycle_time: Option<Duration>,
        switching_time: Option<Duration>,
    ) -> SupervisorResult<CycleConfigPayload> {
        if let Some(cycle_time) = cycle_time {
            check_dwell("cycle_time", cycle_time)?;
        }
        if let Some(switching_time) = switching_time {
            check_dwell("switching_time", switching_time)?;
        }
        if !self.is_active() {
            return Err(SupervisorError::NotSupervising);
        }

        self.inner.cycler.update_timing(cycle_time, switching_time);
        let payload = self.inner.cycler.config_payload();
        component_info!(
            Component::Cycler,
            "⏱️ Timing updated: {}ms dwell, {}ms switching",
            payload.cycle_time_ms,
            payload.switching_time_ms
        );
        self.inner.emit(SweepEvent::CycleConfig(payload.clone()));
        Ok(payload)
    }

    async fn switch_frequency<F>(&self, begin: F) -> SupervisorResult<CycleState>
    where
        F: FnOnce(&FrequencyCycler) -> Option<CycleTransition>,
    {
        let inner = &self.inner;
        let epoch = inner.epoch.load(Ordering::SeqCst);
        if !inner.is_current(epoch) {
            return Err(SupervisorError::NotSupervising);
        }

        let failure = {
            let _control = inner.control.lock().await;
            if !inner.is_current(epoch) {
                return Err(SupervisorError::NotSupervising);
            }
            if inner.tracker.is_recovering() {
                component_debug!(Component::Cycler, "⏸️ Recovery in progress, holding frequency");
                return Ok(inner.cycler.state());
            }
            let Some(transition) = begin(&inner.cycler) else {
                return Ok(inner.cycler.state());
            };
            component_info!(Component::Cycler, "🔀 Switching {} → {}", transition.from, transition.to);
            self.emit_status();

            inner.generation.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = inner.process.force_kill().await {
                component_warn!(Component::Cycler, "⚠️ Kill during switch failed: {}", e);
            }

            if !self.pause(inner.cycler.switching_time(), epoch).await {
                inner.cycler.abort_transition();
                return Err(SupervisorError::NotSupervising);
            }

            match self.spawn_sweep(transition.to, epoch, SpawnReason::Switch).await {
                Ok(_) => {
                    let state = inner.cycler.complete_transition(&transition);
                    inner.emit(SweepEvent::CycleConfig(inner.cycler.config_payload()));
                    self.emit_status();
                    return Ok(state);
                }
                Err(e) => {
                    inner.cycler.complete_transition(&transition);
                    e
                }
            }
        };

        component_error!(Component::Cycler, "❌ Sweep failed to start on new range: {}", failure);
        inner.emit(SweepEvent::error(failure.code(), failure.to_string()));
        self.recover(&format!("Frequency switch failed: {failure}")).await;
        Err(failure)
    }

    /// Run the recovery sequence: kill, cleanup, settle, respawn at the
    /// current frequency, retried with backoff within the remaining budget.
    ///
    /// A second caller while one recovery runs is skipped, not queued.
    pub async fn recover(&self, reason: &str) -> RecoveryOutcome {
        self.recover_from(reason, None).await
    }

    /// Recovery for a failure seen on process generation `observed`. If that
    /// process has since been killed or replaced the failure is stale and
    /// nothing happens.
    async fn recover_from(&self, reason: &str, observed: Option<u64>) -> RecoveryOutcome {
        let inner = &self.inner;
        let epoch = inner.epoch.load(Ordering::SeqCst);
        let superseded = || observed.is_some_and(|g| inner.generation.load(Ordering::SeqCst) != g);
        if !inner.is_current(epoch) || superseded() {
            return RecoveryOutcome::Skipped;
        }

        let guard = match inner.tracker.begin_recovery() {
            Ok(guard) => guard,
            Err(RecoveryDenied::InProgress) => {
                component_debug!(Component::Recovery, "Recovery already in progress, skipping: {}", reason);
                return RecoveryOutcome::Skipped;
            }
            Err(RecoveryDenied::CoolingDown) => {
                component_debug!(Component::Recovery, "Recovery cooling down, skipping: {}", reason);
                return RecoveryOutcome::Skipped;
            }
            Err(RecoveryDenied::Exhausted) => {
                self.exhaust(reason, None).await;
                return RecoveryOutcome::Exhausted;
            }
        };

        let control = inner.control.lock().await;
        if inner.is_current(epoch) && superseded() {
            component_debug!(Component::Recovery, "Process already replaced, dropping recovery: {}", reason);
            guard.cancel();
            return RecoveryOutcome::Skipped;
        }

        let range = inner.cycler.current();
        let record = inner.tracker.record_failure(reason, range);
        if let Some(range) = range {
            if inner.tracker.should_blacklist(&range) {
                self.blacklist_range(range, record.frequency_errors);
            }
        }
        if inner.is_current(epoch) && inner.tracker.has_max_failures_per_minute() {
            drop(control);
            drop(guard);
            let detail = format!("{} failures in the last minute", record.recent_failures);
            self.exhaust(reason, Some(detail)).await;
            return RecoveryOutcome::Exhausted;
        }

        component_warn!(Component::Recovery, "🔧 Starting recovery: {}", reason);
        inner.set_health(Some(ProcessHealth::Unhealthy), Some(StartupPhase::Recovering));

        let result = if inner.is_current(epoch) {
            let options = RetryOptions::new(
                guard.remaining(),
                inner.config.recovery.retry_delay,
                inner.config.recovery.backoff,
            );
            with_retry_if(
                || self.restart_once(epoch, reason),
                &options,
                |e: &SupervisorError| !e.is_permanent() && inner.is_current(epoch),
            )
            .await
        } else {
            Err(SupervisorError::NotSupervising)
        };
        drop(control);

        match result {
            Ok(pid) => {
                let attempt = inner.tracker.attempts() + 1;
                inner.tracker.record_success();
                inner.set_health(None, Some(StartupPhase::Starting));
                component_info!(Component::Recovery, "✅ Recovery complete (PID: {})", pid);
                inner.emit(SweepEvent::RecoveryComplete(inner.recovery_payload(attempt, reason)));
                self.emit_status();
                RecoveryOutcome::Recovered { pid }
            }
            Err(_) if !inner.is_current(epoch) => {
                component_info!(Component::Recovery, "Recovery abandoned, supervision stopped");
                RecoveryOutcome::Aborted
            }
            Err(e) if e.is_permanent() => {
                let message = e.to_string();
                component_error!(Component::Recovery, "❌ Recovery hit a permanent error: {}", message);
                inner.emit(SweepEvent::error(e.code(), message.clone()));
                drop(guard);
                let _ = self.shutdown_session("error", false).await;
                RecoveryOutcome::Fatal { message }
            }
            Err(e) => {
                drop(guard);
                self.exhaust(&format!("{reason} (last error: {e})"), None).await;
                RecoveryOutcome::Exhausted
            }
        }
    }

    /// Take a failing range out of the cycle. The cursor moves off it when
    /// it is the current one, so the next restart lands elsewhere.
    fn blacklist_range(&self, range: FrequencyRange, errors: u32) {
        let inner = &self.inner;
        if !inner.cycler.blacklist(&range) {
            return;
        }
        component_warn!(Component::Cycler, "🚫 Blacklisting {} after {} errors", range, errors);
        inner.emit(SweepEvent::error(
            ErrorCode::FrequencyBlacklisted,
            format!("{range} removed from the cycle after {errors} errors"),
        ));
        inner.emit(SweepEvent::CycleConfig(inner.cycler.config_payload()));
    }

    async fn restart_once(&self, epoch: u64, reason: &str) -> SupervisorResult<u32> {
        let inner = &self.inner;
        if !inner.is_current(epoch) {
            return Err(SupervisorError::NotSupervising);
        }

        let attempt = inner.tracker.attempts() + 1;
        inner.emit(SweepEvent::RecoveryStart(inner.recovery_payload(attempt, reason)));
        component_info!(
            Component::Recovery,
            "🔄 Recovery attempt {}/{}",
            attempt,
            inner.tracker.max_attempts()
        );

        inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = inner.process.force_kill().await {
            component_warn!(Component::Recovery, "⚠️ Kill before restart failed: {}", e);
        }
        inner.process.cleanup().await;

        if !self.pause(inner.config.recovery.settle_delay, epoch).await {
            return Err(SupervisorError::NotSupervising);
        }

        let range = inner.cycler.current().ok_or(SupervisorError::NoFrequencies)?;
        let result = match self.spawn_sweep(range, epoch, SpawnReason::Recovery).await {
            Ok(pid) if inner.process.is_alive(pid) => Ok(pid),
            Ok(pid) => Err(SupervisorError::spawn(
                SpawnFailureKind::Other,
                format!("process {pid} exited right after spawn"),
            )),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            if inner.is_current(epoch) {
                let attempts = inner.tracker.record_error(e, "recovery restart", Some(range));
                component_warn!(
                    Component::Recovery,
                    "⚠️ Restart failed ({}/{}): {}",
                    attempts,
                    inner.tracker.max_attempts(),
                    e
                );
            }
        }
        result
    }

    /// Give up: report and end the session. `detail` replaces the default
    /// attempt-count message.
    async fn exhaust(&self, reason: &str, detail: Option<String>) {
        let inner = &self.inner;
        let attempts = inner.tracker.attempts();
        let max = inner.tracker.max_attempts();
        let detail = detail.unwrap_or_else(|| format!("Max recovery attempts reached ({attempts}/{max})"));
        component_error!(Component::Recovery, "💀 {}, stopping sweep: {}", detail, reason);
        inner.emit(SweepEvent::RecoveryExhausted(inner.recovery_payload(attempts, reason)));
        inner.emit(SweepEvent::error(ErrorCode::RecoveryExhausted, detail));
        let _ = self.shutdown_session("recovery_exhausted", false).await;
    }
}

/// Resolves once the session's shutdown flag is raised or its sender is gone.
/// The borrow `wait_for` hands back is dropped here so callers stay `Send`.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

fn check_dwell(field: &str, value: Duration) -> SupervisorResult<()> {
    if value.is_zero() || value > MAX_CYCLE_TIME {
        return Err(SupervisorError::config(field, format!("{}ms", value.as_millis())));
    }
    Ok(())
}
