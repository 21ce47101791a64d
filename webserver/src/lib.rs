//! HTTP and SSE surface for the sweep supervisor
//!
//! Exposes sweep control, hardware arbitration and a live event stream. All
//! routes share one supervisor, one arbiter and one stream broadcaster.

pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod web;
pub mod webserver_impl;

// Re-export main types
pub use config::{BroadcasterConfig, ServerConfig};
pub use error::{WebServerError, WebServerResult};
pub use services::{ConnectionHandle, StreamBroadcaster};
pub use state::{AppState, Supervisor};
pub use webserver_impl::WebServer;
