//! Bounded retry with backoff

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Constant delay between attempts
    Linear,
    /// `delay * 2^attempt_index`
    #[default]
    Exponential,
}

impl Backoff {
    /// Delay to wait after the failed attempt with the given zero-based index
    pub fn delay_for(&self, base: Duration, attempt_index: u32) -> Duration {
        match self {
            Backoff::Linear => base,
            Backoff::Exponential => base.saturating_mul(1u32.checked_shl(attempt_index).unwrap_or(u32::MAX)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(1000),
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryOptions {
    pub fn new(attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self { attempts, delay, backoff }
    }
}

/// Retry `operation` on every failure until the attempt budget is spent
pub async fn with_retry<F, Fut, T, E>(operation: F, options: &RetryOptions) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(operation, options, |_| true).await
}

/// Retry `operation` while `should_retry` accepts the error.
///
/// The first call happens immediately. The last error is returned once the
/// budget is spent or `should_retry` declines.
pub async fn with_retry_if<F, Fut, T, E, P>(mut operation: F, options: &RetryOptions, mut should_retry: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let attempts = options.attempts.max(1);
    let mut attempt_index = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let remaining = attempt_index + 1 < attempts;
                if !remaining || !should_retry(&e) {
                    return Err(e);
                }
                let delay = options.backoff.delay_for(options.delay, attempt_index);
                tracing::debug!(attempt = attempt_index + 1, delay_ms = delay.as_millis() as u64, "🔄 Retrying after failure");
                sleep(delay).await;
                attempt_index += 1;
            }
        }
    }
}
