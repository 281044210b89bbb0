//! Bounded retry around a single external call.
//!
//! Callers classify each failure into one of three classes rather than a
//! boolean, because the pipeline reacts differently to a rate limit (abort
//! the surrounding batch), a transient fault (retry, then degrade), and a
//! rejected request (fail this one call only).

use std::future::Future;
use std::time::Duration;

/// How a failed call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Stop immediately and abort the surrounding batch (rate limit, quota).
    FatalImmediate,
    /// Worth retrying: connection reset, 5xx, expired auth token.
    RetryableTransient,
    /// The request itself was rejected; retrying cannot help.
    FatalClient,
}

/// Trait for errors the retry policy can classify.
///
/// Classification is evaluated fresh on every failure; attempt N may yield a
/// different class than attempt 1.
pub trait ClassifyError {
    fn class(&self) -> ErrorClass;
}

/// Retry settings for external calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of calls allowed, including the first one.
    pub max_attempts: u32,
    /// Delay before each retry. Applied only between attempts, never after
    /// the final one.
    pub delay: Duration,
    /// Per-retry delay multiplier; 1.0 keeps the delay fixed.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(30),
            backoff_multiplier: 1.0,
        }
    }
}

/// Terminal failure of a retried call.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// A fatal-immediate failure; the caller should abort its batch.
    #[error("aborted without retry: {0}")]
    Aborted(#[source] E),

    /// Transient failures exhausted the attempt budget.
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The request was rejected by the service; not retried.
    #[error("request rejected: {0}")]
    Rejected(#[source] E),
}

/// Run `operation` with bounded retries per `config`.
///
/// At most `config.max_attempts` calls are made. Transient failures sleep
/// `config.delay` (scaled by the backoff multiplier on each retry) before the
/// next attempt; fatal classes return without sleeping.
pub async fn run_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ClassifyError + std::error::Error + 'static,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.delay;

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => match e.class() {
                ErrorClass::FatalImmediate => {
                    tracing::error!(error = %e, "fatal failure, aborting without retry");
                    return Err(RetryError::Aborted(e));
                }
                ErrorClass::FatalClient => {
                    tracing::error!(error = %e, "request rejected, not retrying");
                    return Err(RetryError::Rejected(e));
                }
                ErrorClass::RetryableTransient => {
                    if attempt == max_attempts {
                        tracing::error!(
                            error = %e,
                            attempts = max_attempts,
                            "transient failure, attempt budget exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            attempts: max_attempts,
                            source: e,
                        });
                    }
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                }
            },
        }
    }

    unreachable!("loop returns on every branch of the final attempt")
}
