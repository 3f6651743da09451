//! Per-key timer registry for eviction and refresh.
//!
//! Each (kind, key) pair holds at most one timer. Arming replaces and aborts
//! the previous timer; cancelling aborts it. A timer that fires first removes
//! its own registry slot, and only acts if the slot was still its own, so a
//! timer superseded while its task was already running never fires.

use crate::key::CacheKey;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// What a timer does when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Delete an unreferenced entry.
    Eviction,
    /// Silently reload an entry after its cache life.
    Refresh,
}

struct TimerSlot {
    id: u64,
    handle: AbortHandle,
}

type Registry<K> = Arc<DashMap<K, TimerSlot>>;

pub(crate) struct Scheduler<K> {
    runtime: Handle,
    eviction: Registry<K>,
    refresh: Registry<K>,
    next_id: AtomicU64,
}

impl<K: CacheKey> Scheduler<K> {
    pub fn new(runtime: Handle) -> Self {
        Scheduler {
            runtime,
            eviction: Arc::new(DashMap::new()),
            refresh: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn registry(&self, kind: TimerKind) -> &Registry<K> {
        match kind {
            TimerKind::Eviction => &self.eviction,
            TimerKind::Refresh => &self.refresh,
        }
    }

    /// Arm the `kind` timer for `key`, replacing any previous one.
    pub fn arm<F>(&self, kind: TimerKind, key: K, after: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(self.registry(kind));

        // The map entry stays locked until the slot is stored, so a timer
        // with a zero delay cannot look for its slot before it exists.
        match self.registry(kind).entry(key.clone()) {
            MapEntry::Occupied(mut occupied) => {
                let handle = self.spawn(registry, key, id, after, on_fire);
                let previous = occupied.insert(TimerSlot { id, handle });
                previous.handle.abort();
            }
            MapEntry::Vacant(vacant) => {
                let handle = self.spawn(registry, key, id, after, on_fire);
                vacant.insert(TimerSlot { id, handle });
            }
        }
    }

    /// Arm the `kind` timer for `key` unless one is already pending.
    /// Returns whether a new timer was armed.
    pub fn arm_if_idle<F>(&self, kind: TimerKind, key: K, after: Duration, on_fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let registry = Arc::clone(self.registry(kind));
        match self.registry(kind).entry(key.clone()) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let handle = self.spawn(registry, key, id, after, on_fire);
                vacant.insert(TimerSlot { id, handle });
                true
            }
        }
    }

    fn spawn<F>(&self, registry: Registry<K>, key: K, id: u64, after: Duration, on_fire: F) -> AbortHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.runtime
            .spawn(async move {
                tokio::time::sleep(after).await;
                if registry.remove_if(&key, |_, slot| slot.id == id).is_some() {
                    on_fire();
                }
            })
            .abort_handle()
    }

    /// Disarm the `kind` timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, kind: TimerKind, key: &K) -> bool {
        match self.registry(kind).remove(key) {
            Some((_, slot)) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self, key: &K) {
        self.cancel(TimerKind::Eviction, key);
        self.cancel(TimerKind::Refresh, key);
    }

    pub fn clear(&self) {
        for registry in [&self.eviction, &self.refresh] {
            registry.iter().for_each(|slot| slot.handle.abort());
            registry.clear();
        }
    }

    pub fn is_armed(&self, kind: TimerKind, key: &K) -> bool {
        self.registry(kind).contains_key(key)
    }

    pub fn pending(&self, kind: TimerKind) -> usize {
        self.registry(kind).len()
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}
