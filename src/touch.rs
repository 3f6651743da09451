//! Bulk refresh of every key matching a predicate.

use crate::cache::Cache;
use crate::key::{CacheKey, CacheValue};
use futures::future::join_all;

/// What a [`Cache::touch`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TouchReport {
    /// Referenced keys that were reloaded.
    pub reloaded: usize,
    /// Unreferenced keys that were deleted instead.
    pub evicted: usize,
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
    /// Reload every key matching `predicate`, e.g. after the server signalled
    /// that its state changed.
    ///
    /// Matching keys nobody subscribes to are deleted outright. The others are
    /// reloaded concurrently, and all outcomes are committed together once the
    /// last load finished, so subscribers see one update wave instead of a
    /// notification per completed request.
    pub async fn touch<P>(&self, predicate: P) -> TouchReport
    where
        P: Fn(&K) -> bool,
    {
        let mut report = TouchReport::default();
        let mut loads = Vec::new();

        for key in self.keys().into_iter().filter(|key| predicate(key)) {
            match self.inner.store.subscriber_count(&key) {
                Some(0) => {
                    self.delete(&key);
                    report.evicted += 1;
                }
                Some(_) => loads.push(self.load(key)),
                None => {}
            }
        }

        report.reloaded = loads.len();
        for settle in join_all(loads).await {
            settle.apply();
        }

        info!(
            "✓ TOUCH reloaded {} key(s), evicted {} key(s)",
            report.reloaded, report.evicted
        );
        report
    }
}
