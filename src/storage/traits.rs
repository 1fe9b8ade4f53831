//! Storage traits and error types
//!
//! This module defines the trait interface for the work database and the
//! error type shared by every persistence path (database, journal,
//! checkpoint files).

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt data in {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for the frontier's work database
///
/// Fingerprints are stored as the bit pattern of a `u64`. Spilled records
/// are opaque JSON text ordered by a per-queue sequence number.
pub trait Storage: Send {
    // ===== Fingerprints =====

    /// Inserts a fingerprint, returning true if it was not already present
    fn insert_fingerprint(&mut self, fp: u64) -> StorageResult<bool>;

    /// Inserts many fingerprints in one transaction
    fn insert_fingerprints(&mut self, fps: &[u64]) -> StorageResult<()>;

    fn contains_fingerprint(&self, fp: u64) -> StorageResult<bool>;

    fn count_fingerprints(&self) -> StorageResult<u64>;

    /// Streams every stored fingerprint to `sink`
    fn export_fingerprints(
        &self,
        sink: &mut dyn FnMut(u64) -> std::io::Result<()>,
    ) -> StorageResult<()>;

    // ===== Spilled queue records =====

    /// Appends a record to a queue's spilled tail
    fn spill(&mut self, key: &str, seq: i64, record: &str) -> StorageResult<()>;

    /// Removes and returns up to `limit` of a queue's oldest spilled records
    fn unspill(&mut self, key: &str, limit: usize) -> StorageResult<Vec<String>>;

    /// Reads a queue's spilled records in order without removing them
    fn read_spilled(&self, key: &str) -> StorageResult<Vec<String>>;

    // ===== Maintenance =====

    /// Removes every row from every table
    fn reset(&mut self) -> StorageResult<()>;
}
