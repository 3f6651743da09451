//! Cache handle: store operations, loading and entry lifetime.

use crate::config::CacheConfig;
use crate::entry::{Entry, EntryStatus, InFlight, Patch};
use crate::error::{Error, Result};
use crate::key::{CacheKey, CacheValue};
use crate::loader::Loader;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::retry::{self, RetryDelay, RetryPolicy};
use crate::scheduler::{Scheduler, TimerKind};
use crate::settle::Settle;
use crate::store::Store;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;

pub(crate) struct Inner<K, V> {
    pub(crate) store: Store<K, V>,
    pub(crate) scheduler: Scheduler<K>,
    pub(crate) metrics: Box<dyn CacheMetrics>,
    loader: Arc<dyn Loader<K, V>>,
    config: CacheConfig,
    retry: RetryPolicy,
    next_load_id: AtomicU64,
}

/// Key-addressed cache of asynchronously loaded values.
///
/// `Cache` is a cheap handle (`Arc` inside); clone it freely to share one
/// cache between tasks.
///
/// # Example
///
/// ```
/// use live_cache::{Cache, Error, Subscriber};
/// use live_cache::loader::FnLoader;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Error> {
/// let cache = Cache::new(FnLoader::new(|n: u64| async move { Ok::<_, Error>(n * 2) }))?;
///
/// // Compute, then commit when ready.
/// let settle = cache.load(21).await;
/// settle.apply();
/// assert_eq!(cache.get(&21).and_then(|e| e.into_data()), Some(42));
///
/// // Keep it alive while something depends on it.
/// let on_change = Subscriber::new(|| println!("21 changed"));
/// cache.subscribe(&21, &on_change)?;
/// # Ok(())
/// # }
/// ```
pub struct Cache<K, V> {
    pub(crate) inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`Cache`].
pub struct CacheBuilder<K, V> {
    loader: Arc<dyn Loader<K, V>>,
    config: CacheConfig,
    delay: Option<RetryDelay>,
    metrics: Box<dyn CacheMetrics>,
    runtime: Option<Handle>,
}

impl<K: CacheKey, V: CacheValue> CacheBuilder<K, V> {
    pub fn new(loader: impl Loader<K, V>) -> Self {
        CacheBuilder {
            loader: Arc::new(loader),
            config: CacheConfig::default(),
            delay: None,
            metrics: Box::new(NoOpMetrics),
            runtime: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn removal_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_removal_timeout(timeout);
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.config = self.config.with_retry_count(count);
        self
    }

    pub fn cache_life(mut self, life: Duration) -> Self {
        self.config = self.config.with_cache_life(life);
        self
    }

    /// Delay between retries, given the failed attempt (0-based) and its error.
    pub fn delay(mut self, delay: impl Fn(u32, &Error) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Some(Arc::new(delay));
        self
    }

    /// Set custom metrics handler.
    pub fn metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Spawn timers on this runtime instead of the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// # Errors
    /// Returns `Error::ConfigError` if the configuration is invalid or no
    /// runtime was given and none is current.
    pub fn build(self) -> Result<Cache<K, V>> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                Error::ConfigError(format!("cache timers need a tokio runtime: {}", e))
            })?,
        };

        let retry = RetryPolicy {
            retry_count: self.config.retry_count,
            delay: self.delay,
        };

        debug!(
            "✓ Cache built (removal timeout {:?}, retries {}, cache life {:?})",
            self.config.removal_timeout(),
            retry.retry_count,
            self.config.cache_life()
        );

        Ok(Cache {
            inner: Arc::new(Inner {
                store: Store::new(),
                scheduler: Scheduler::new(runtime),
                metrics: self.metrics,
                loader: self.loader,
                config: self.config,
                retry,
                next_load_id: AtomicU64::new(0),
            }),
        })
    }
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
    /// Create a cache with default configuration.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` when called outside a tokio runtime.
    pub fn new(loader: impl Loader<K, V>) -> Result<Self> {
        CacheBuilder::new(loader).build()
    }

    pub fn builder(loader: impl Loader<K, V>) -> CacheBuilder<K, V> {
        CacheBuilder::new(loader)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Store
    // ------------------------------------------------------------------

    /// Snapshot of the entry for `key`. No side effects.
    pub fn get(&self, key: &K) -> Option<Entry<V>> {
        self.inner.store.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.store.contains(key)
    }

    /// Merge `patch` into the entry for `key` and notify its subscribers.
    ///
    /// Creates the entry if absent. An unreferenced entry without a pending
    /// eviction gets one; an already running removal window is kept. With a
    /// cache life configured, the refresh timer is re-armed.
    pub fn set(&self, key: K, patch: Patch<V>) {
        let subscribers = self
            .inner
            .store
            .merge(key.clone(), patch, || self.ensure_removal(&key));
        debug!("✓ SET {:?} ({} subscribers)", key, subscribers.len());

        if let Some(life) = self.inner.config.cache_life() {
            self.schedule_refresh(&key, life);
        }

        self.notify(&key, &subscribers);
    }

    /// Cancel the key's timers and remove it. Missing keys are a no-op.
    pub fn delete(&self, key: &K) {
        self.inner.scheduler.cancel_all(key);
        if self.inner.store.remove(key) {
            debug!("✓ DELETE {:?}", key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all keys currently present.
    pub fn keys(&self) -> Vec<K> {
        self.inner.store.keys()
    }

    /// Drop every entry and every pending timer.
    pub fn clear(&self) {
        self.inner.scheduler.clear();
        self.inner.store.clear();
        warn!("⚠ CLEAR executed - all entries dropped!");
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Run the loader for `key` (with retries) and return the uncommitted outcome.
    ///
    /// The entry is marked in flight immediately and stays so through every
    /// retry. Nothing else changes until the returned [`Settle`] is applied.
    ///
    /// A second `load` for a key that is already loading starts an
    /// independent operation; check [`Entry::in_flight`] first to avoid it.
    pub async fn load(&self, key: K) -> Settle<K, V> {
        let id = self.inner.next_load_id.fetch_add(1, Ordering::Relaxed);
        let (in_flight, completion) = InFlight::new(id);
        self.set(key.clone(), Patch::new().with_in_flight(in_flight));

        let outcome = retry::run(
            &*self.inner.loader,
            &key,
            &self.inner.retry,
            &*self.inner.metrics,
        )
        .await;

        Settle::new(self.clone(), key, outcome, completion)
    }

    /// Load `key` and commit the outcome right away.
    pub async fn refresh(&self, key: K) {
        self.load(key).await.apply();
    }

    /// Pull-based read: return the value, loading it if needed.
    ///
    /// Waits on a running load instead of starting another one. If that load
    /// is abandoned (its `Settle` dropped), loads the key itself.
    ///
    /// # Errors
    /// Returns the entry's settled error if the last load failed.
    pub async fn fetch(&self, key: K) -> Result<V> {
        loop {
            let waiting_on = match self.get(&key) {
                Some(entry) => match entry.status() {
                    EntryStatus::Ready(data) => return Ok(data.clone()),
                    EntryStatus::Failed(error) => return Err(error.clone()),
                    EntryStatus::Loading(in_flight) => Some(in_flight.clone()),
                    EntryStatus::Empty => None,
                },
                None => None,
            };

            match waiting_on {
                Some(in_flight) => {
                    in_flight.wait().await;
                    let unchanged = self
                        .get(&key)
                        .and_then(|e| e.in_flight().map(|f| f.id()))
                        == Some(in_flight.id());
                    if unchanged {
                        self.refresh(key.clone()).await;
                    }
                }
                None => self.refresh(key.clone()).await,
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------

    /// Arm (or re-arm) the eviction timer for `key`.
    ///
    /// After `removal_timeout` the entry is deleted unless a subscriber
    /// arrived in the meantime.
    pub fn schedule_removal(&self, key: &K) {
        self.inner.scheduler.arm(
            TimerKind::Eviction,
            key.clone(),
            self.inner.config.removal_timeout(),
            self.eviction_task(key),
        );
    }

    /// Arm the eviction timer for `key` unless one is already pending.
    fn ensure_removal(&self, key: &K) {
        self.inner.scheduler.arm_if_idle(
            TimerKind::Eviction,
            key.clone(),
            self.inner.config.removal_timeout(),
            self.eviction_task(key),
        );
    }

    fn eviction_task(&self, key: &K) -> impl FnOnce() + Send + 'static {
        let weak = Arc::downgrade(&self.inner);
        let target = key.clone();
        move || {
            if let Some(cache) = Self::upgrade(&weak) {
                cache.evict(&target);
            }
        }
    }

    fn schedule_refresh(&self, key: &K, life: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let target = key.clone();
        self.inner
            .scheduler
            .arm(TimerKind::Refresh, key.clone(), life, move || {
                if let Some(cache) = Self::upgrade(&weak) {
                    cache.spawn_refresh(target);
                }
            });
    }

    fn upgrade(weak: &Weak<Inner<K, V>>) -> Option<Self> {
        weak.upgrade().map(|inner| Cache { inner })
    }

    fn evict(&self, key: &K) {
        if self.inner.store.remove_unreferenced(key) {
            self.inner.scheduler.cancel(TimerKind::Refresh, key);
            self.inner.metrics.record_eviction(key);
            debug!("✓ EVICT {:?}", key);
        }
    }

    /// Silent reload triggered by the refresh timer; nobody awaits it.
    fn spawn_refresh(&self, key: K) {
        if !self.contains_key(&key) {
            return;
        }
        self.inner.metrics.record_refresh(&key);
        let cache = self.clone();
        self.inner.scheduler.runtime().spawn(async move {
            let settle = cache.load(key).await;
            // Evicted or deleted while loading: do not bring it back.
            if cache.contains_key(settle.key()) {
                settle.apply();
            }
        });
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    pub fn stats(&self) -> CacheStats {
        let counts = self.inner.store.counts();
        CacheStats {
            entries: counts.entries,
            loading: counts.loading,
            failed: counts.failed,
            subscribers: counts.subscribers,
            pending_evictions: self.inner.scheduler.pending(TimerKind::Eviction),
            pending_refreshes: self.inner.scheduler.pending(TimerKind::Refresh),
        }
    }

    /// Print cache statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "Cache Stats: {} entries ({} loading, {} failed), {} subscribers, {} evictions / {} refreshes pending",
            stats.entries,
            stats.loading,
            stats.failed,
            stats.subscribers,
            stats.pending_evictions,
            stats.pending_refreshes
        );
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub loading: usize,
    pub failed: usize,
    pub subscribers: usize,
    pub pending_evictions: usize,
    pub pending_refreshes: usize,
}
