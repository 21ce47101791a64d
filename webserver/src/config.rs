//! Serving configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{WebServerError, WebServerResult};

/// Per-connection pacing for the stream broadcaster
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcasterConfig {
    /// Minimum gap between spectrum frames to one connection
    pub spectrum_throttle: Duration,
    pub heartbeat_interval: Duration,
    /// Connections with no successful delivery for this long are dropped
    pub inactivity_timeout: Duration,
    /// How often the inactivity sweep runs
    pub sweep_interval: Duration,
    /// Bounded queue per connection; a full queue drops the event
    pub queue_capacity: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            spectrum_throttle: Duration::from_millis(50),
            heartbeat_interval: Duration::from_secs(10),
            inactivity_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
            queue_capacity: 256,
        }
    }
}

impl BroadcasterConfig {
    pub fn validate(&self) -> WebServerResult<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(WebServerError::config("heartbeat_interval must be positive"));
        }
        if self.sweep_interval.is_zero() {
            return Err(WebServerError::config("sweep_interval must be positive"));
        }
        if self.queue_capacity == 0 {
            return Err(WebServerError::config("queue_capacity must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub broadcaster: BroadcasterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8092)),
            broadcaster: BroadcasterConfig::default(),
        }
    }
}
