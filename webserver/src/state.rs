//! Shared handler state
//!
//! The context object built once at startup: one supervisor, one arbiter and
//! one broadcaster, handed by reference to every route.

use std::sync::Arc;
use std::time::Instant;
use supervisor::{HostProbe, ProcessControl, ResourceArbiter, SweepSupervisor};

use crate::services::StreamBroadcaster;

pub type Supervisor<P, H> = SweepSupervisor<P, H, StreamBroadcaster>;

pub struct AppState<P, H> {
    pub supervisor: Supervisor<P, H>,
    pub broadcaster: Arc<StreamBroadcaster>,
    pub arbiter: Arc<ResourceArbiter>,
    pub started_at: Instant,
}

impl<P, H> Clone for AppState<P, H> {
    fn clone(&self) -> Self {
        Self {
            supervisor: self.supervisor.clone(),
            broadcaster: self.broadcaster.clone(),
            arbiter: self.arbiter.clone(),
            started_at: self.started_at,
        }
    }
}

impl<P, H> AppState<P, H>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    pub fn new(supervisor: Supervisor<P, H>, broadcaster: Arc<StreamBroadcaster>) -> Self {
        let arbiter = supervisor.arbiter().clone();
        Self {
            supervisor,
            broadcaster,
            arbiter,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
