//! Shared logging utilities for consistent tracing across all components

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{error, info};

/// Logical component a log line originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Supervisor,
    ProcessManager,
    Cycler,
    Health,
    Recovery,
    Arbiter,
    Broadcaster,
    WebServer,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Supervisor => "supervisor",
            Component::ProcessManager => "process_manager",
            Component::Cycler => "cycler",
            Component::Health => "health",
            Component::Recovery => "recovery",
            Component::Arbiter => "arbiter",
            Component::Broadcaster => "broadcaster",
            Component::WebServer => "webserver",
        };
        f.write_str(name)
    }
}

/// Per-crate filter directives for a base level
pub fn filter_directives(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!("supervisor={base_level},webserver={base_level},shared={base_level},tower_http=warn,axum={base_level}")
}

/// Initialize the stdout tracing subscriber. Call once from the binary.
pub fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = filter_directives(log_level);
    println!("📊 Log level: {env_filter}");

    fmt()
        .with_env_filter(EnvFilter::new(&env_filter))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for component-aware info logging
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware warning logging
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware error logging
#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware debug logging
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

pub fn log_startup(component: Component, details: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

pub fn log_shutdown(component: Component, reason: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

pub fn log_error(component: Component, context: &str, error: &dyn std::fmt::Display) {
    error!(
        component = %component,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

pub fn log_success(component: Component, message: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_display() {
        assert_eq!(Component::Health.to_string(), "health");
        assert_eq!(Component::ProcessManager.to_string(), "process_manager");
    }

    #[test]
    fn test_filter_directives_use_level() {
        let filter = filter_directives(Some("debug"));
        assert!(filter.contains("supervisor=debug"));
        assert!(filter.contains("shared=debug"));
        assert!(filter.contains("tower_http=warn"));
    }
}
