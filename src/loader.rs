//! Loader contract: the caller-supplied async source of values.
//!
//! The engine never fetches data itself. It calls a [`Loader`] whenever a key
//! must be (re)populated: on `load`, on refresh timers and on `touch`.
//!
//! # Simple and batch loaders
//!
//! A simple loader resolves one value for the requested key:
//!
//! ```
//! use live_cache::loader::FnLoader;
//! use live_cache::Error;
//!
//! let loader = FnLoader::new(|num: u64| async move { Ok::<_, Error>(num * 2) });
//! ```
//!
//! A batch loader resolves the requested key and any related keys the same
//! request happened to produce (e.g. a user lookup that also returns the
//! user's organisation). Every pair is committed through the same path:
//!
//! ```
//! use live_cache::loader::BatchFnLoader;
//! use live_cache::Error;
//!
//! let loader = BatchFnLoader::new(|key: String| async move {
//!     let user = format!("value of {key}");
//!     Ok::<_, Error>(vec![(key, user), ("org:7".to_string(), "acme".to_string())])
//! });
//! ```
//!
//! # Errors
//!
//! Return `Err` for any failure. Errors are retried up to the configured
//! `retry_count` regardless of kind, then stored in the entry.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt::Debug;
use std::future::Future;

/// What a loader resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum Loaded<K, V> {
    /// A value for the requested key.
    Single(V),
    /// Values for the requested key and possibly other keys.
    Batch(Vec<(K, V)>),
}

impl<K: PartialEq + Debug, V> Loaded<K, V> {
    /// Check that a batch actually resolves `requested`.
    ///
    /// # Errors
    /// Returns `Error::LoadFailure` if a batch omits the requested key, which
    /// would otherwise leave that key in flight forever.
    pub(crate) fn ensure_resolves(self, requested: &K) -> Result<Self> {
        match &self {
            Loaded::Batch(pairs) if !pairs.iter().any(|(k, _)| k == requested) => {
                Err(Error::LoadFailure(format!(
                    "batch load did not resolve requested key {:?}",
                    requested
                )))
            }
            _ => Ok(self),
        }
    }

    /// Number of keys this result commits.
    pub fn len(&self) -> usize {
        match self {
            Loaded::Single(_) => 1,
            Loaded::Batch(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trait for loader implementations.
///
/// The returned future must be `'static` and `Send`: refresh timers run it
/// on a spawned task, detached from any caller.
pub trait Loader<K, V>: Send + Sync + 'static {
    /// Produce the value(s) for `key`.
    fn load(&self, key: K) -> BoxFuture<'static, Result<Loaded<K, V>>>;
}

/// Adapter turning `Fn(K) -> Future<Output = Result<V>>` into a [`Loader`].
#[derive(Clone)]
pub struct FnLoader<F> {
    f: F,
}

impl<F> FnLoader<F> {
    pub fn new(f: F) -> Self {
        FnLoader { f }
    }
}

impl<K, V, F, Fut> Loader<K, V> for FnLoader<F>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
{
    fn load(&self, key: K) -> BoxFuture<'static, Result<Loaded<K, V>>> {
        (self.f)(key).map(|r| r.map(Loaded::Single)).boxed()
    }
}

/// Adapter turning `Fn(K) -> Future<Output = Result<Vec<(K, V)>>>` into a [`Loader`].
#[derive(Clone)]
pub struct BatchFnLoader<F> {
    f: F,
}

impl<F> BatchFnLoader<F> {
    pub fn new(f: F) -> Self {
        BatchFnLoader { f }
    }
}

impl<K, V, F, Fut> Loader<K, V> for BatchFnLoader<F>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<(K, V)>>> + Send + 'static,
{
    fn load(&self, key: K) -> BoxFuture<'static, Result<Loaded<K, V>>> {
        (self.f)(key).map(|r| r.map(Loaded::Batch)).boxed()
    }
}
