//! Error types for the cache engine.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache engine.
///
/// Errors are `Clone` because a terminal load failure is stored inside the
/// entry and handed out with every snapshot of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The loader failed for a key.
    ///
    /// Retried up to the configured `retry_count`, then committed as the
    /// entry's settled error. Consumers only see it when they read the entry.
    LoadFailure(String),

    /// An operation needed an entry that does not exist.
    ///
    /// Returned by `subscribe`/`unsubscribe` when the key was never loaded or
    /// set, or has already been evicted. This is caller misuse: consumers are
    /// expected to `load` or `set` before subscribing.
    MissingEntry(String),

    /// A subscriber callback panicked during notification.
    ///
    /// Never returned to callers. It is reported to metrics and logged;
    /// delivery to the remaining subscribers continues.
    CallbackFailure(String),

    /// Invalid configuration, or no tokio runtime available at build time.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Build a [`Error::LoadFailure`] from anything displayable.
    ///
    /// Convenient inside loaders: `.map_err(Error::load)?`.
    pub fn load(e: impl fmt::Display) -> Self {
        Error::LoadFailure(e.to_string())
    }

    /// Whether this error came out of a loader.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Error::LoadFailure(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::LoadFailure(msg) => write!(f, "Load failure: {}", msg),
            Error::MissingEntry(key) => write!(f, "Missing entry: {}", key),
            Error::CallbackFailure(msg) => write!(f, "Subscriber callback failed: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ConfigError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
