//! Pending-URI queues
//!
//! Every politeness key owns one [`HostQueue`]. Its pending records live in
//! a [`PendingQueue`], chosen by configuration:
//!
//! - [`MemoryQueue`]: a plain in-memory FIFO
//! - [`SpillingQueue`]: an in-memory head that overflows into the SQLite
//!   work database

mod host_queue;
mod memory;
mod spill;

pub use host_queue::HostQueue;
pub use memory::MemoryQueue;
pub use spill::SpillingQueue;

use crate::config::{QueueBackend, StorageConfig};
use crate::state::UriRecord;
use crate::storage::{SqliteStorage, StorageResult};
use std::sync::{Arc, Mutex};

/// FIFO of pending records for one politeness key
pub trait PendingQueue: Send {
    /// Appends a record at the tail
    fn push_back(&mut self, record: UriRecord) -> StorageResult<()>;

    /// Removes and returns the head record
    fn pop_front(&mut self) -> StorageResult<Option<UriRecord>>;

    /// Returns the head record without removing it
    fn peek(&mut self) -> StorageResult<Option<&UriRecord>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies every pending record in order
    fn snapshot(&self) -> StorageResult<Vec<UriRecord>>;
}

/// Builds the pending queue for each newly created key
#[derive(Clone)]
pub enum QueueFactory {
    Memory,
    Spill {
        storage: Arc<Mutex<SqliteStorage>>,
        threshold: usize,
    },
}

impl QueueFactory {
    /// Selects the backend named by the storage configuration
    ///
    /// `storage` must be present when the spill backend is configured.
    pub fn from_config(config: &StorageConfig, storage: Option<Arc<Mutex<SqliteStorage>>>) -> Self {
        match (config.queues, storage) {
            (QueueBackend::Spill, Some(storage)) => Self::Spill {
                storage,
                threshold: config.queue_memory_threshold,
            },
            _ => Self::Memory,
        }
    }

    pub fn create(&self, key: &str) -> Box<dyn PendingQueue> {
        match self {
            Self::Memory => Box::new(MemoryQueue::new()),
            Self::Spill { storage, threshold } => {
                Box::new(SpillingQueue::new(key, Arc::clone(storage), *threshold))
            }
        }
    }
}
