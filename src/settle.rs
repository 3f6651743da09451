//! Deferred commit of a load outcome.

use crate::cache::Cache;
use crate::entry::{Completion, Patch};
use crate::error::Result;
use crate::key::{CacheKey, CacheValue};
use crate::loader::Loaded;
use std::fmt;

/// Outcome of a `load`, not yet visible in the cache.
///
/// Nothing changes until [`apply`](Self::apply) is called, so the caller
/// picks the moment the new value (or error) becomes observable. Dropping a
/// `Settle` discards the outcome and releases anyone waiting on the load's
/// `InFlight` handle; the entry keeps its in-flight marker until the next
/// commit.
#[must_use = "a load outcome is not visible until it is applied"]
pub struct Settle<K: CacheKey, V: CacheValue> {
    cache: Cache<K, V>,
    key: K,
    outcome: Result<Loaded<K, V>>,
    completion: Completion,
}

impl<K: CacheKey, V: CacheValue> Settle<K, V> {
    pub(crate) fn new(
        cache: Cache<K, V>,
        key: K,
        outcome: Result<Loaded<K, V>>,
        completion: Completion,
    ) -> Self {
        Settle {
            cache,
            key,
            outcome,
            completion,
        }
    }

    /// The key that was requested.
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Peek at the outcome without committing it.
    pub fn outcome(&self) -> &Result<Loaded<K, V>> {
        &self.outcome
    }

    /// Commit the outcome.
    ///
    /// Success sets data and clears error/in-flight for every resolved key;
    /// failure sets the error and clears data/in-flight for the requested key.
    /// Each commit notifies that key's subscribers.
    pub fn apply(self) {
        let Settle {
            cache,
            key,
            outcome,
            completion,
        } = self;

        match outcome {
            Ok(Loaded::Single(data)) => cache.set(key, Patch::resolved(data)),
            Ok(Loaded::Batch(pairs)) => {
                for (resolved, data) in pairs {
                    cache.set(resolved, Patch::resolved(data));
                }
            }
            Err(error) => cache.set(key, Patch::failed(error)),
        }

        drop(completion);
    }
}

impl<K: CacheKey, V: CacheValue> fmt::Debug for Settle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle")
            .field("key", &self.key)
            .field("ok", &self.outcome.is_ok())
            .finish()
    }
}
