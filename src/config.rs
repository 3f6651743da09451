//! Cache configuration.
//!
//! [`CacheConfig`] holds the serialisable knobs of the engine. It can be built
//! in code with the `with_*` setters or deserialised from JSON:
//!
//! ```
//! use live_cache::CacheConfig;
//!
//! let config = CacheConfig::from_json(r#"{ "retry_count": 3, "cache_life_ms": 30000 }"#)
//!     .expect("valid config");
//!
//! assert_eq!(config.retry_count, 3);
//! assert_eq!(config.removal_timeout_ms, 180_000); // default
//! ```
//!
//! The retry delay is a function and therefore not part of this struct; pass
//! it to `CacheBuilder::delay`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default grace window before an unreferenced entry is deleted (3 minutes).
pub const DEFAULT_REMOVAL_TIMEOUT_MS: u64 = 3 * 60 * 1000;

/// Default number of retries after the first failed load.
pub const DEFAULT_RETRY_COUNT: u32 = 1;

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// How long an entry survives after its last subscriber leaves.
    pub removal_timeout_ms: u64,

    /// Number of retries after the first failed loader call (0 = no retry).
    pub retry_count: u32,

    /// If set, every commit re-arms a refresh timer for this long; when it
    /// fires, the key is silently reloaded.
    pub cache_life_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            removal_timeout_ms: DEFAULT_REMOVAL_TIMEOUT_MS,
            retry_count: DEFAULT_RETRY_COUNT,
            cache_life_ms: None,
        }
    }
}

impl CacheConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` on malformed JSON, unknown fields or
    /// values rejected by [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_removal_timeout(mut self, timeout: Duration) -> Self {
        self.removal_timeout_ms = saturating_millis(timeout);
        self
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn with_cache_life(mut self, life: Duration) -> Self {
        self.cache_life_ms = Some(saturating_millis(life));
        self
    }

    pub fn removal_timeout(&self) -> Duration {
        Duration::from_millis(self.removal_timeout_ms)
    }

    pub fn cache_life(&self) -> Option<Duration> {
        self.cache_life_ms.map(Duration::from_millis)
    }

    /// Reject configurations that would make timers spin.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if `removal_timeout_ms` is zero or
    /// `cache_life_ms` is `Some(0)`.
    pub fn validate(&self) -> Result<()> {
        if self.removal_timeout_ms == 0 {
            return Err(Error::ConfigError(
                "removal_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.cache_life_ms == Some(0) {
            return Err(Error::ConfigError(
                "cache_life_ms must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
