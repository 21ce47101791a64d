//! Deadline combinator
//!
//! The wrapped operation runs as its own task. When the deadline fires the
//! caller stops waiting, but the operation keeps running to completion, so
//! any side effect it has (a spawn that eventually succeeds) can still land.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Returned when the deadline elapses before the operation completes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TimeoutError {
    pub timeout: Duration,
    pub message: String,
}

impl TimeoutError {
    pub fn new(timeout: Duration, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| format!("Operation timed out after {}ms", timeout.as_millis()));
        Self { timeout, message }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutOptions {
    pub timeout: Duration,
    pub message: Option<String>,
}

impl TimeoutOptions {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, message: None }
    }

    /// Override the default error message (fluent API)
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Race `operation` against a timer.
///
/// Resolves with the operation's output if it completes first, otherwise with
/// a [`TimeoutError`] carrying the configured duration. A panic inside the
/// operation is resumed on the caller.
pub async fn with_timeout<F>(operation: F, options: &TimeoutOptions) -> Result<F::Output, TimeoutError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut handle = tokio::spawn(operation);
    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);

    tokio::select! {
        biased;
        joined = &mut handle => match joined {
            Ok(output) => Ok(output),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Only reachable while the runtime is shutting down
            Err(_) => Err(TimeoutError::new(options.timeout, options.message.clone())),
        },
        _ = &mut deadline => Err(TimeoutError::new(options.timeout, options.message.clone())),
    }
}
