//! Held hardware custody, released on drop

use crate::core::arbiter::{Acquisition, ResourceArbiter};
use crate::error::{SupervisorError, SupervisorResult};
use shared::logging::Component;
use shared::{component_error, HardwareDevice};
use std::future::Future;
use std::sync::Arc;

/// Ownership of one device for one tool.
///
/// Dropping the guard releases the device.
#[derive(Debug)]
pub struct HardwareGuard {
    arbiter: Arc<ResourceArbiter>,
    tool: String,
    device: HardwareDevice,
}

impl HardwareGuard {
    /// Acquire or fail with the current owner attached
    pub fn acquire(arbiter: Arc<ResourceArbiter>, tool: &str, device: HardwareDevice) -> SupervisorResult<Self> {
        match arbiter.acquire(tool, device) {
            Acquisition::Granted => Ok(Self {
                arbiter,
                tool: tool.to_string(),
                device,
            }),
            Acquisition::Denied { owner } => Err(SupervisorError::ResourceConflict { device, owner }),
        }
    }

    /// Acquire, run a destructive reconfiguration, then verify it took.
    ///
    /// Nothing is touched unless the acquire succeeds. If either step fails
    /// the device is released before the error is returned.
    pub async fn reconfigure<C, CFut, V, VFut>(
        arbiter: Arc<ResourceArbiter>,
        tool: &str,
        device: HardwareDevice,
        configure: C,
        verify: V,
    ) -> SupervisorResult<Self>
    where
        C: FnOnce() -> CFut,
        CFut: Future<Output = SupervisorResult<()>>,
        V: FnOnce() -> VFut,
        VFut: Future<Output = Result<(), String>>,
    {
        let guard = Self::acquire(arbiter, tool, device)?;

        configure().await?;

        if let Err(reason) = verify().await {
            component_error!(
                Component::Arbiter,
                "❌ {} did not come up as expected for {}: {}",
                device,
                tool,
                reason
            );
            drop(guard);
            return Err(SupervisorError::VerificationFailed { device, reason });
        }

        Ok(guard)
    }

    pub fn device(&self) -> HardwareDevice {
        self.device
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for HardwareGuard {
    fn drop(&mut self) {
        self.arbiter.release(&self.tool, self.device);
    }
}
