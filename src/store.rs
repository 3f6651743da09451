//! Key -> entry map owned by the cache.
//!
//! Uses DashMap for concurrent access with per-key sharding. Every method
//! takes and releases the shard lock internally; nothing here awaits or
//! calls back into user code, so callers run notifications after the lock
//! is gone.

use crate::entry::{Entry, InFlight, Patch};
use crate::error::Error;
use crate::key::{CacheKey, CacheValue};
use crate::ledger::Subscriber;
use dashmap::DashMap;

/// Internal per-key record.
struct Slot<V> {
    data: Option<V>,
    error: Option<Error>,
    in_flight: Option<InFlight>,
    subscribers: Vec<Subscriber>,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Slot {
            data: None,
            error: None,
            in_flight: None,
            subscribers: Vec::new(),
        }
    }
}

impl<V: Clone> Slot<V> {
    fn snapshot(&self) -> Entry<V> {
        Entry {
            data: self.data.clone(),
            error: self.error.clone(),
            in_flight: self.in_flight.clone(),
            subscribers: self.subscribers.len(),
        }
    }
}

/// Aggregate counts over all entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct StoreCounts {
    pub entries: usize,
    pub loading: usize,
    pub failed: usize,
    pub subscribers: usize,
}

pub(crate) struct Store<K, V> {
    entries: DashMap<K, Slot<V>>,
}

impl<K: CacheKey, V: CacheValue> Store<K, V> {
    pub fn new() -> Self {
        Store {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<Entry<V>> {
        self.entries.get(key).map(|slot| slot.snapshot())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Merge `patch` into the entry for `key`, creating it if absent.
    ///
    /// `on_unreferenced` runs under the entry lock when the entry has no
    /// subscribers. Returns the subscribers to notify, snapshotted under the
    /// lock.
    pub fn merge<F>(&self, key: K, patch: Patch<V>, on_unreferenced: F) -> Vec<Subscriber>
    where
        F: FnOnce(),
    {
        let mut slot = self.entries.entry(key).or_insert_with(Slot::empty);
        patch.data.apply(&mut slot.data);
        patch.error.apply(&mut slot.error);
        patch.in_flight.apply(&mut slot.in_flight);
        if slot.subscribers.is_empty() {
            on_unreferenced();
        }
        slot.subscribers.clone()
    }

    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove the entry only if nobody subscribes to it.
    pub fn remove_unreferenced(&self, key: &K) -> bool {
        self.entries
            .remove_if(key, |_, slot| slot.subscribers.is_empty())
            .is_some()
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn subscriber_count(&self, key: &K) -> Option<usize> {
        self.entries.get(key).map(|slot| slot.subscribers.len())
    }

    /// Add a subscriber. `None` if the entry is missing, `Some(false)` if it
    /// was already subscribed.
    ///
    /// `on_referenced` runs under the entry lock whenever the entry exists.
    pub fn add_subscriber<F>(&self, key: &K, subscriber: &Subscriber, on_referenced: F) -> Option<bool>
    where
        F: FnOnce(),
    {
        let mut slot = self.entries.get_mut(key)?;
        on_referenced();
        if slot.subscribers.contains(subscriber) {
            return Some(false);
        }
        slot.subscribers.push(subscriber.clone());
        Some(true)
    }

    /// Remove a subscriber. `None` if the entry is missing, otherwise the
    /// number of subscribers left.
    ///
    /// `on_unreferenced` runs under the entry lock if nobody is left.
    pub fn remove_subscriber<F>(&self, key: &K, subscriber: &Subscriber, on_unreferenced: F) -> Option<usize>
    where
        F: FnOnce(),
    {
        let mut slot = self.entries.get_mut(key)?;
        slot.subscribers.retain(|s| s != subscriber);
        if slot.subscribers.is_empty() {
            on_unreferenced();
        }
        Some(slot.subscribers.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn counts(&self) -> StoreCounts {
        self.entries
            .iter()
            .fold(StoreCounts::default(), |mut counts, slot| {
                counts.entries += 1;
                counts.subscribers += slot.subscribers.len();
                if slot.in_flight.is_some() {
                    counts.loading += 1;
                }
                if slot.error.is_some() && slot.data.is_none() {
                    counts.failed += 1;
                }
                counts
            })
    }
}
