//! Subscription ledger: who depends on which key.
//!
//! Subscribers are counted by identity, not by number of calls: subscribing
//! the same [`Subscriber`] twice is a no-op, and one `unsubscribe` removes it.
//! When the last subscriber leaves, the key's eviction timer is armed; any
//! new subscriber disarms it. Both happen under the entry lock, so a pending
//! eviction always matches an empty subscriber set.

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::key::{CacheKey, CacheValue};
use crate::scheduler::TimerKind;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Opaque notification handle.
///
/// Equality is identity: clones of one `Subscriber` are equal, two handles
/// built from identical closures are not.
#[derive(Clone)]
pub struct Subscriber {
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl Subscriber {
    pub fn new(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Subscriber {
            callback: Arc::new(callback),
        }
    }

    /// Invoke the callback, turning a panic into an error.
    pub(crate) fn notify(&self) -> Result<()> {
        catch_unwind(AssertUnwindSafe(|| (self.callback)())).map_err(|panic| {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Error::CallbackFailure(msg)
        })
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.callback) as *const ()
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Subscriber {}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscriber").field(&self.addr()).finish()
    }
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
    /// Register `subscriber` for change notifications on `key`.
    ///
    /// Cancels a pending eviction of the key.
    ///
    /// # Errors
    /// Returns `Error::MissingEntry` if the key has no entry; `load` or `set`
    /// it first.
    pub fn subscribe(&self, key: &K, subscriber: &Subscriber) -> Result<()> {
        let added = self.inner.store.add_subscriber(key, subscriber, || {
            self.inner.scheduler.cancel(TimerKind::Eviction, key);
        });
        match added {
            None => Err(Error::MissingEntry(format!("{:?}", key))),
            Some(added) => {
                if added {
                    debug!("✓ SUBSCRIBE {:?}", key);
                }
                Ok(())
            }
        }
    }

    /// Remove `subscriber` from `key`; arms eviction once nobody is left.
    ///
    /// # Errors
    /// Returns `Error::MissingEntry` if the key has no entry.
    pub fn unsubscribe(&self, key: &K, subscriber: &Subscriber) -> Result<()> {
        let left = self
            .inner
            .store
            .remove_subscriber(key, subscriber, || self.schedule_removal(key));
        match left {
            None => Err(Error::MissingEntry(format!("{:?}", key))),
            Some(0) => {
                debug!("✓ UNSUBSCRIBE {:?} (unreferenced)", key);
                Ok(())
            }
            Some(_) => {
                debug!("✓ UNSUBSCRIBE {:?}", key);
                Ok(())
            }
        }
    }

    /// Fan out a change notification to a snapshot of subscribers.
    ///
    /// A panicking callback is reported and skipped; the rest still run.
    pub(crate) fn notify(&self, key: &K, subscribers: &[Subscriber]) {
        for subscriber in subscribers {
            if let Err(error) = subscriber.notify() {
                warn!("Subscriber of {:?} failed: {}", key, error);
                self.inner.metrics.record_notify_failure(key, &error);
            }
        }
    }
}
