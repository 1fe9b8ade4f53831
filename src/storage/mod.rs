//! Storage module for everything the frontier persists
//!
//! This module handles:
//! - The SQLite work database backing disk fingerprints and spilled queues
//! - The write-ahead journal of schedule and finish events
//! - Point-in-time checkpoints and the checkpoint catalogue

pub mod checkpoint;
pub mod journal;
mod schema;
mod sqlite;
mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointManifest, CheckpointWriter, CounterSnapshot, QueueSnapshot,
};
pub use journal::{Journal, JournalEntry, JournalOp};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use std::path::Path;

/// Opens the work database and empties it
///
/// The work database never carries state across runs: a fresh frontier
/// starts from nothing and a recovered one is rebuilt from its checkpoint.
pub fn open_work_database(path: &Path) -> StorageResult<SqliteStorage> {
    let mut storage = SqliteStorage::open(path)?;
    storage.reset()?;
    Ok(storage)
}
