//! Retry with bounded exponential backoff.
//!
//! Used around both language-model completions and remote business-API
//! calls. The policy and the retryable-error predicate are configuration; the
//! wrapped operation is any async closure.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Backoff policy: attempt cap and delay bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Base delay in seconds, doubled after every failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(15),
            multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Policy without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 0.0,
        }
    }

    /// Delay before the attempt that follows failed attempt `failed_attempt` (1-based).
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(30) as i32;
        let secs = (self.multiplier * 2f64.powi(exponent)).max(0.0);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay);
        delay.clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }
}

/// Terminal failure of a retried call, carrying the original error.
#[derive(Debug, Error)]
#[error("{label} failed after {attempts} attempt(s): {source}")]
pub struct RetryError<E: std::error::Error + 'static> {
    pub label: String,
    pub attempts: u32,
    /// `true` when the error was retryable and the attempt cap was reached.
    pub exhausted: bool,
    #[source]
    pub source: E,
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn into_inner(self) -> E {
        self.source
    }
}

/// Retry `op` for errors that classify themselves through [`Retryable`].
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    op: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with(policy, label, |err: &E| err.is_retryable(), op).await
}

/// Retry `op` while `is_retryable` accepts the error and attempts remain.
///
/// Logs one warning per failed attempt that is followed by another attempt;
/// a call that succeeds the first time logs nothing.
pub async fn retry_with<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = is_retryable(&err);
                if !retryable || attempt >= max_attempts {
                    return Err(RetryError {
                        label: label.to_string(),
                        attempts: attempt,
                        exhausted: retryable,
                        source: err,
                    });
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    call = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays_stay_within_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(15));
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(5);
        assert_eq!(policy.delay_for(3), Duration::ZERO);
    }
}
