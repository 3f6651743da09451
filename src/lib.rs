//! # live-cache
//!
//! An in-memory, key-addressed cache of asynchronously loaded values that
//! keeps entries alive while something depends on them.
//!
//! ## Features
//!
//! - **Deferred commit:** [`Cache::load`] computes, [`Settle::apply`] publishes
//! - **Subscriptions:** change notifications per key, counted by identity
//! - **Eviction:** unreferenced entries go away after a removal timeout
//! - **Refresh:** entries reload themselves once their cache life runs out
//! - **Retries:** failed loads are retried with an optional delay
//! - **Touch:** bulk reload of every key matching a predicate
//! - **Batch loaders:** one request may resolve several keys
//!
//! ## Quick Start
//!
//! ```
//! use live_cache::{Cache, Error, Subscriber};
//! use live_cache::loader::FnLoader;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Error> {
//! // 1. Describe how values are produced
//! let loader = FnLoader::new(|num: u64| async move { Ok::<_, Error>(num * 2) });
//!
//! // 2. Build the cache
//! let cache = Cache::builder(loader)
//!     .removal_timeout(Duration::from_secs(60))
//!     .retry_count(2)
//!     .build()?;
//!
//! // 3. Load and commit
//! cache.load(4).await.apply();
//! assert_eq!(cache.get(&4).and_then(|e| e.into_data()), Some(8));
//!
//! // 4. Depend on it
//! let on_change = Subscriber::new(|| println!("4 changed"));
//! cache.subscribe(&4, &on_change)?;
//!
//! // 5. Invalidate everything, subscribers see the reload
//! cache.touch(|_| true).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`CacheConfig`] can also be read from JSON:
//!
//! ```
//! use live_cache::CacheConfig;
//!
//! let config = CacheConfig::from_json(r#"{ "removal_timeout_ms": 5000, "cache_life_ms": 60000 }"#)
//!     .expect("valid config");
//! assert_eq!(config.retry_count, 1);
//! ```

#[macro_use]
extern crate log;

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod ledger;
pub mod loader;
pub mod observability;
pub mod retry;
pub mod scheduler;
pub mod settle;
mod store;
pub mod touch;

// Re-exports for convenience
pub use cache::{Cache, CacheBuilder, CacheStats};
pub use config::CacheConfig;
pub use entry::{Entry, EntryStatus, Field, InFlight, Patch};
pub use error::{Error, Result};
pub use ledger::Subscriber;
pub use loader::{BatchFnLoader, FnLoader, Loaded, Loader};
pub use observability::{CacheMetrics, LogMetrics, NoOpMetrics};
pub use retry::{RetryDelay, RetryPolicy};
pub use scheduler::TimerKind;
pub use settle::Settle;
pub use touch::TouchReport;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
