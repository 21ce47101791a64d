//! Exclusive custody of scarce hardware
//!
//! One authority for every tool on the host, whether or not it touches the
//! sweep subprocess. Acquire is an atomic check-and-set under a single lock.

use crate::traits::EventSink;
use chrono::Utc;
use shared::logging::Component;
use shared::{component_info, component_warn, HardwareDevice, ResourceLock, SweepEvent};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Result of an acquire call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Granted,
    /// Someone already holds the device
    Denied { owner: String },
}

impl Acquisition {
    pub fn is_granted(&self) -> bool {
        matches!(self, Acquisition::Granted)
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            Acquisition::Granted => None,
            Acquisition::Denied { owner } => Some(owner),
        }
    }
}

/// Result of a release call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    Released,
    /// Caller was not the owner; nothing changed
    NotOwner { owner: Option<String> },
}

pub struct ResourceArbiter {
    locks: Mutex<BTreeMap<HardwareDevice, ResourceLock>>,
    events: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for ResourceArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceArbiter").field("locks", &self.status()).finish()
    }
}

impl Default for ResourceArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceArbiter {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(BTreeMap::new()),
            events: None,
        }
    }

    /// Emit arbitration events to a sink (fluent API)
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<HardwareDevice, ResourceLock>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SweepEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    /// Grant `device` to `tool` if nobody owns it.
    ///
    /// A tool re-acquiring a device it already holds is denied with itself as
    /// the owner.
    pub fn acquire(&self, tool: &str, device: HardwareDevice) -> Acquisition {
        let outcome = {
            let mut locks = self.lock();
            let entry = locks.entry(device).or_insert_with(|| ResourceLock::unowned(device));
            match &entry.owner {
                Some(owner) => Acquisition::Denied { owner: owner.clone() },
                None => {
                    entry.owner = Some(tool.to_string());
                    entry.acquired_at = Some(Utc::now());
                    Acquisition::Granted
                }
            }
        };

        match &outcome {
            Acquisition::Granted => {
                component_info!(Component::Arbiter, "🔒 {} acquired by {}", device, tool);
                self.emit(SweepEvent::HardwareAcquired {
                    device,
                    owner: tool.to_string(),
                });
            }
            Acquisition::Denied { owner } => {
                component_warn!(Component::Arbiter, "⛔ {} denied to {}: owned by {}", device, tool, owner);
                self.emit(SweepEvent::HardwareRejected {
                    device,
                    requester: tool.to_string(),
                    owner: owner.clone(),
                });
            }
        }
        outcome
    }

    /// Clear ownership if `tool` is the owner; otherwise a no-op
    pub fn release(&self, tool: &str, device: HardwareDevice) -> Release {
        let outcome = {
            let mut locks = self.lock();
            match locks.get_mut(&device) {
                Some(entry) if entry.owner.as_deref() == Some(tool) => {
                    entry.owner = None;
                    entry.acquired_at = None;
                    Release::Released
                }
                Some(entry) => Release::NotOwner { owner: entry.owner.clone() },
                None => Release::NotOwner { owner: None },
            }
        };

        match &outcome {
            Release::Released => {
                component_info!(Component::Arbiter, "🔓 {} released by {}", device, tool);
                self.emit(SweepEvent::HardwareReleased {
                    device,
                    owner: tool.to_string(),
                });
            }
            Release::NotOwner { owner } => {
                component_warn!(
                    Component::Arbiter,
                    "⚠️ {} tried to release {} owned by {:?}",
                    tool,
                    device,
                    owner
                );
            }
        }
        outcome
    }

    /// Clear ownership unconditionally. Returns the previous owner.
    ///
    /// Only the supervisor calls this, after stopping anything of its own
    /// that is still using the device.
    pub(crate) fn force_release(&self, device: HardwareDevice) -> Option<String> {
        let previous = {
            let mut locks = self.lock();
            locks.get_mut(&device).and_then(|entry| {
                entry.acquired_at = None;
                entry.owner.take()
            })
        };

        if let Some(owner) = &previous {
            component_warn!(Component::Arbiter, "🔨 {} force-released from {}", device, owner);
            self.emit(SweepEvent::HardwareReleased {
                device,
                owner: owner.clone(),
            });
        }
        previous
    }

    pub fn owner(&self, device: HardwareDevice) -> Option<String> {
        self.lock().get(&device).and_then(|entry| entry.owner.clone())
    }

    pub fn is_available(&self, device: HardwareDevice) -> bool {
        self.owner(device).is_none()
    }

    /// One entry per known device, including never-acquired ones
    pub fn status(&self) -> Vec<ResourceLock> {
        let locks = self.lock();
        HardwareDevice::ALL
            .iter()
            .map(|device| locks.get(device).cloned().unwrap_or_else(|| ResourceLock::unowned(*device)))
            .collect()
    }
}
