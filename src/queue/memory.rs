use crate::queue::PendingQueue;
use crate::state::UriRecord;
use crate::storage::StorageResult;
use std::collections::VecDeque;

/// In-memory FIFO of pending records
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: VecDeque<UriRecord>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingQueue for MemoryQueue {
    fn push_back(&mut self, record: UriRecord) -> StorageResult<()> {
        self.items.push_back(record);
        Ok(())
    }

    fn pop_front(&mut self) -> StorageResult<Option<UriRecord>> {
        Ok(self.items.pop_front())
    }

    fn peek(&mut self) -> StorageResult<Option<&UriRecord>> {
        Ok(self.items.front())
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn snapshot(&self) -> StorageResult<Vec<UriRecord>> {
        Ok(self.items.iter().cloned().collect())
    }
}
