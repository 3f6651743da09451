//! Observability hooks for the cache engine.
//!
//! Implement [`CacheMetrics`] to feed load, retry, eviction and refresh events
//! into your monitoring system:
//!
//! ```ignore
//! use live_cache::observability::CacheMetrics;
//! use std::fmt::Debug;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_load(&self, _key: &dyn Debug, _attempt: u32, duration: Duration) {
//!         // histogram!("cache_load_latency").record(duration);
//!     }
//!     // ... override the other hooks as needed
//! }
//!
//! // let cache = Cache::builder(loader)
//! //     .metrics(Box::new(PrometheusMetrics))
//! //     .build()?;
//! ```
//!
//! Default behavior uses [`NoOpMetrics`]. [`LogMetrics`] keeps the trait's
//! default methods, which write every event to the `log` crate.
//!
//! # Hooks
//!
//! - `record_load()` - Loader succeeded, with the attempt that succeeded
//! - `record_retry()` - Loader failed and will be retried
//! - `record_error()` - Loader failed terminally
//! - `record_eviction()` - Unreferenced entry deleted by its eviction timer
//! - `record_refresh()` - Refresh timer started a silent reload
//! - `record_notify_failure()` - A subscriber callback panicked
//!
//! All hooks run synchronously on the engine's call path; keep them cheap.

use crate::error::Error;
use std::fmt::Debug;
use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a successful load.
    fn record_load(&self, key: &dyn Debug, attempt: u32, duration: Duration) {
        debug!("Cache LOAD: {:?} (attempt {}) took {:?}", key, attempt, duration);
    }

    /// Record a failed attempt that will be retried.
    fn record_retry(&self, key: &dyn Debug, attempt: u32, error: &Error) {
        debug!("Cache RETRY: {:?} after attempt {}: {}", key, attempt, error);
    }

    /// Record a terminal load failure.
    fn record_error(&self, key: &dyn Debug, error: &Error) {
        warn!("Cache ERROR for {:?}: {}", key, error);
    }

    /// Record an eviction.
    fn record_eviction(&self, key: &dyn Debug) {
        debug!("Cache EVICT: {:?}", key);
    }

    /// Record a timer-driven refresh.
    fn record_refresh(&self, key: &dyn Debug) {
        debug!("Cache REFRESH: {:?}", key);
    }

    /// Record a subscriber callback failure.
    fn record_notify_failure(&self, key: &dyn Debug, error: &Error) {
        warn!("Cache NOTIFY failure for {:?}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_load(&self, _key: &dyn Debug, _attempt: u32, _duration: Duration) {}
    fn record_retry(&self, _key: &dyn Debug, _attempt: u32, _error: &Error) {}
    fn record_error(&self, _key: &dyn Debug, _error: &Error) {}
    fn record_eviction(&self, _key: &dyn Debug) {}
    fn record_refresh(&self, _key: &dyn Debug) {}
    fn record_notify_failure(&self, _key: &dyn Debug, _error: &Error) {}
}

/// Metrics implementation that logs every event.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}
