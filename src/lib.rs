//! Sumi-Frontier: the polite crawl frontier
//!
//! This crate decides which discovered URI a crawler should fetch next. It
//! deduplicates URIs by fingerprint, serializes fetches per politeness key,
//! enforces a delay between requests to the same key, and survives restarts
//! through a write-ahead journal plus point-in-time checkpoints.

pub mod config;
pub mod fingerprint;
pub mod frontier;
pub mod output;
pub mod queue;
pub mod state;
pub mod storage;
pub mod url;

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Main error type for frontier operations
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue for key '{key}' is not held by a worker")]
    NotBusy { key: String },

    #[error("Corrupt checkpoint at {}: {reason}", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("Frontier has been terminated")]
    Terminated,

    #[error("Frontier halted after a fatal error: {0}")]
    Fatal(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for frontier operations
pub type Result<T> = std::result::Result<T, FrontierError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// Locks a mutex, recovering the guard if a panicking holder poisoned it.
///
/// Every structure guarded this way is left consistent between statements,
/// so the data behind a poisoned lock is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// Re-export commonly used types
pub use config::Config;
pub use frontier::{Frontier, Next, ScheduleOutcome};
pub use state::{Directive, Disposition, FetchOutcome, FetchStatus, Hop, QueueState, UriRecord};
pub use url::{canonicalize, CanonRule, QueueKeyPolicy};
