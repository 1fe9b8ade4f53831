use crate::lock;
use crate::queue::PendingQueue;
use crate::state::UriRecord;
use crate::storage::{SqliteStorage, Storage, StorageResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// FIFO that keeps its head in memory and spills its tail to disk
///
/// Up to `threshold` records are held in memory. Once the head is full,
/// further records go to the `spilled_uris` table; while anything is
/// spilled, new records must also go to disk so that order is preserved.
/// When the head drains, the oldest spilled records are pulled back in.
pub struct SpillingQueue {
    key: String,
    storage: Arc<Mutex<SqliteStorage>>,
    threshold: usize,
    head: VecDeque<UriRecord>,
    spilled: usize,
    next_seq: i64,
}

impl SpillingQueue {
    pub fn new(key: &str, storage: Arc<Mutex<SqliteStorage>>, threshold: usize) -> Self {
        Self {
            key: key.to_string(),
            storage,
            threshold: threshold.max(1),
            head: VecDeque::new(),
            spilled: 0,
            next_seq: 0,
        }
    }

    /// Number of records currently on disk
    #[cfg(test)]
    pub fn spilled(&self) -> usize {
        self.spilled
    }

    fn refill(&mut self) -> StorageResult<()> {
        if !self.head.is_empty() || self.spilled == 0 {
            return Ok(());
        }

        let rows = lock(&self.storage).unspill(&self.key, self.threshold)?;
        self.spilled = self.spilled.saturating_sub(rows.len());
        for row in rows {
            self.head.push_back(serde_json::from_str(&row)?);
        }

        trace!(
            "Refilled queue {} with {} records ({} still spilled)",
            self.key,
            self.head.len(),
            self.spilled
        );
        Ok(())
    }
}

impl PendingQueue for SpillingQueue {
    fn push_back(&mut self, record: UriRecord) -> StorageResult<()> {
        if self.spilled == 0 && self.head.len() < self.threshold {
            self.head.push_back(record);
            return Ok(());
        }

        let json = serde_json::to_string(&record)?;
        lock(&self.storage).spill(&self.key, self.next_seq, &json)?;
        self.next_seq += 1;
        self.spilled += 1;
        Ok(())
    }

    fn pop_front(&mut self) -> StorageResult<Option<UriRecord>> {
        self.refill()?;
        Ok(self.head.pop_front())
    }

    fn peek(&mut self) -> StorageResult<Option<&UriRecord>> {
        self.refill()?;
        Ok(self.head.front())
    }

    fn len(&self) -> usize {
        self.head.len() + self.spilled
    }

    fn snapshot(&self) -> StorageResult<Vec<UriRecord>> {
        let mut records: Vec<UriRecord> = self.head.iter().cloned().collect();
        if self.spilled > 0 {
            for row in lock(&self.storage).read_spilled(&self.key)? {
                records.push(serde_json::from_str(&row)?);
            }
        }
        Ok(records)
    }
}
