//! Retry controller: drives a loader until success or exhaustion.
//!
//! Retries are bounded by count only. Every error is retried the same way;
//! the optional delay function decides how long to wait between attempts.

use crate::error::{Error, Result};
use crate::key::{CacheKey, CacheValue};
use crate::loader::{Loaded, Loader};
use crate::observability::CacheMetrics;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Delay before the next attempt, given the failed attempt (0-based) and its error.
pub type RetryDelay = Arc<dyn Fn(u32, &Error) -> Duration + Send + Sync>;

/// Exponential backoff: `base * 2^attempt`, capped at `max`.
///
/// ```
/// use live_cache::retry::exponential_backoff;
/// use live_cache::Error;
/// use std::time::Duration;
///
/// let delay = exponential_backoff(Duration::from_millis(100), Duration::from_secs(1));
/// assert_eq!(delay(0, &Error::load("x")), Duration::from_millis(100));
/// assert_eq!(delay(2, &Error::load("x")), Duration::from_millis(400));
/// assert_eq!(delay(9, &Error::load("x")), Duration::from_secs(1));
/// ```
pub fn exponential_backoff(base: Duration, max: Duration) -> RetryDelay {
    Arc::new(move |attempt: u32, _error: &Error| {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        base.checked_mul(factor).map_or(max, |d| d.min(max))
    })
}

/// How a failing load is retried.
#[derive(Clone, Default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retry_count: u32,
    /// `None` retries immediately.
    pub delay: Option<RetryDelay>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retry_count", &self.retry_count)
            .field("delay", &self.delay.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(retry_count: u32) -> Self {
        RetryPolicy {
            retry_count,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: RetryDelay) -> Self {
        self.delay = Some(delay);
        self
    }

    fn delay_for(&self, attempt: u32, error: &Error) -> Option<Duration> {
        self.delay.as_ref().map(|delay| delay(attempt, error))
    }
}

/// Run `loader` for `key`, retrying failures per `policy`.
///
/// The attempt counter lives only in this call; nothing is persisted in the
/// entry between loads.
pub(crate) async fn run<K, V>(
    loader: &dyn Loader<K, V>,
    key: &K,
    policy: &RetryPolicy,
    metrics: &dyn CacheMetrics,
) -> Result<Loaded<K, V>>
where
    K: CacheKey,
    V: CacheValue,
{
    let mut attempt = 0;

    loop {
        let started = Instant::now();
        let result = loader
            .load(key.clone())
            .await
            .and_then(|loaded| loaded.ensure_resolves(key));

        match result {
            Ok(loaded) => {
                metrics.record_load(key, attempt, started.elapsed());
                return Ok(loaded);
            }
            Err(error) if attempt < policy.retry_count => {
                metrics.record_retry(key, attempt, &error);
                debug!(
                    "Load for {:?} failed (attempt {}/{}), retrying: {}",
                    key,
                    attempt + 1,
                    policy.retry_count + 1,
                    error
                );

                if let Some(delay) = policy.delay_for(attempt, &error) {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(error) => {
                metrics.record_error(key, &error);
                warn!(
                    "Load for {:?} failed after {} attempt(s): {}",
                    key,
                    attempt + 1,
                    error
                );
                return Err(error);
            }
        }
    }
}
