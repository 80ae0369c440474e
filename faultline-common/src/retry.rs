//! Retry with exponential backoff.
//!
//! Failures are classified after every attempt; only kinds in the policy's
//! retryable set are retried. The final error is returned unchanged and is
//! not logged here.

use crate::classify::classify;
use crate::config::RetryConfig;
use crate::errors::{AsFailure, Classification, ErrorKind};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay: Duration,
    /// Kinds worth retrying.
    pub retryable_kinds: BTreeSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            retryable_kinds: ErrorKind::ALL
                .into_iter()
                .filter(|kind| kind.is_transient())
                .collect(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            retryable_kinds: config.retryable.iter().copied().collect(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn with_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_kinds = kinds.into_iter().collect();
        self
    }

    /// Delay after the failed attempt with 0-based index `attempt`:
    /// `base_delay * 2^attempt`, saturating at `Duration::MAX`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2_u32
            .checked_pow(attempt)
            .and_then(|multiplier| self.base_delay.checked_mul(multiplier))
            .unwrap_or(Duration::MAX)
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable_kinds.contains(&kind)
    }
}

/// Passed to the retry observer before each backoff sleep.
#[derive(Debug)]
pub struct RetryEvent<'a, E> {
    /// 1-based number of the retry about to happen.
    pub attempt: u32,
    pub max_retries: u32,
    pub delay: Duration,
    pub classification: Classification,
    pub error: &'a E,
}

/// Run `op` until it succeeds, fails with a non-retryable kind, or the
/// retry budget is spent.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: AsFailure,
{
    retry_with(policy, op, |_: RetryEvent<'_, E>| {}).await
}

/// [`retry`] with an observer called before every retry.
pub async fn retry_with<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    mut op: F,
    mut on_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: AsFailure,
    R: FnMut(RetryEvent<'_, E>),
{
    let mut attempt: u32 = 0;

    loop {
        debug!(attempt, max_retries = policy.max_retries, "Starting attempt");

        let err = match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(attempt, "Attempt succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let classification = classify(&err.as_failure());
        if attempt >= policy.max_retries || !policy.is_retryable(classification.kind) {
            debug!(
                attempt,
                kind = %classification.kind,
                "Giving up, returning last error"
            );
            return Err(err);
        }

        let delay = policy.backoff_delay(attempt);
        warn!(
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            kind = %classification.kind,
            delay_ms = delay.as_millis() as u64,
            "Attempt failed, retrying after backoff"
        );
        on_retry(RetryEvent {
            attempt: attempt + 1,
            max_retries: policy.max_retries,
            delay,
            classification,
            error: &err,
        });
        drop(err);

        sleep(delay).await;
        attempt += 1;
    }
}
