//! Bounded retry for read-only source calls.
//!
//! Only errors classified as recoverable (provider throttling) are retried.
//! Anything else returns on the first failure. Writes to storage are never
//! wrapped: a failed create or delete aborts the task instead.

use std::fmt::Display;
use std::time::Duration;

use taskhub_core::RetrySettings;

use crate::error::SourceError;

/// Classification hook for [`with_retry`].
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;

    /// Provider-supplied wait before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Recoverable for SourceError {
    fn is_recoverable(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Exponential backoff with a hard cap on attempts and on each delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations including the first. Never below 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// `max_attempts` attempts with no delay between them.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.initial_backoff_ms),
            Duration::from_millis(settings.max_backoff_ms),
        )
    }

    /// Delay after the `attempt`-th failure (1-based). A provider hint
    /// replaces the exponential value; both are capped at `max_backoff`.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exponential = self
            .initial_backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(20));
        hint.unwrap_or(exponential).min(self.max_backoff)
    }
}

/// Run `op`, retrying recoverable failures under `policy`.
///
/// Returns the first success, the first unrecoverable error, or the last
/// recoverable error once `policy.max_attempts` is exhausted.
pub fn with_retry<T, E, F>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    E: Recoverable + Display,
    F: FnMut() -> Result<T, E>,
{
    with_retry_using(policy, std::thread::sleep, op)
}

/// [`with_retry`] with an injectable sleep.
pub fn with_retry_using<T, E, F, S>(policy: &RetryPolicy, mut sleep: S, mut op: F) -> Result<T, E>
where
    E: Recoverable + Display,
    F: FnMut() -> Result<T, E>,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_recoverable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt, err.retry_after());
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "recoverable failure, retrying",
                );
                sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
