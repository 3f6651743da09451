//! Key and value bounds, plus key predicates for bulk refresh.

use std::fmt::Debug;
use std::hash::Hash;

/// Bounds every cache key must satisfy.
///
/// Keys are cloned into timer tasks and log lines, so they must be cheap to
/// clone and printable. Implemented automatically.
pub trait CacheKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Bounds every cached value must satisfy.
///
/// Snapshots clone the value; wrap large values in `Arc` to keep reads cheap.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

/// Build a composite string key from parts (`["user", "1"]` -> `"user:1"`).
pub fn composite(parts: &[&str]) -> String {
    parts.join(":")
}

/// Predicate matching string keys that contain `needle`.
///
/// Typical use is invalidating every cached URL under a path after a write:
/// `cache.touch(key::contains("/users/1")).await`.
pub fn contains<K: AsRef<str>>(needle: impl Into<String>) -> impl Fn(&K) -> bool {
    let needle = needle.into();
    move |key: &K| key.as_ref().contains(needle.as_str())
}

/// Predicate matching string keys that start with `prefix`.
pub fn prefix<K: AsRef<str>>(prefix: impl Into<String>) -> impl Fn(&K) -> bool {
    let prefix = prefix.into();
    move |key: &K| key.as_ref().starts_with(prefix.as_str())
}
