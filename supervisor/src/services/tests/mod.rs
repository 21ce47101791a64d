//! Service-specific tests


use std::sync::Arc;
use std::time::Duration;

use crate::core::command::SweepCommandConfig;
use crate::services::process_manager::RealProcessManager;
use crate::traits::{HostProbe, MockHostProbe};

/// Upper bound for anything a real child process has to do
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A manager that runs `/bin/sh`, with orphan scanning disabled so parallel
/// tests never touch each other's children
pub fn shell_manager() -> RealProcessManager {
    manager_with_probe(Arc::new(MockHostProbe::new()))
}

pub fn manager_with_probe(probe: Arc<dyn HostProbe>) -> RealProcessManager {
    RealProcessManager::new(&SweepCommandConfig::new("/bin/sh"), probe)
        .with_orphan_patterns(Vec::new())
        .with_kill_grace(Duration::from_millis(300))
}

pub fn script(body: &str) -> Vec<String> {
    vec!["-c".to_string(), body.to_string()]
}
