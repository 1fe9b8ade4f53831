use crate::queue::PendingQueue;
use crate::state::{Disposition, FetchOutcome, FetchStatus, Politeness, UriRecord};
use crate::storage::{QueueSnapshot, StorageResult};

/// The pending records and fetch history of one politeness key
///
/// Scheduling state (READY/SNOOZED/BUSY/EMPTY and the wake time) is owned by
/// the ready-set scheduler; this type owns the records. Only the worker
/// holding the key pops records, while `schedule()` may append at any time
/// under the queue's lock.
pub struct HostQueue {
    key: String,
    pending: Box<dyn PendingQueue>,
    in_flight: Option<UriRecord>,
    politeness: Politeness,
    fetched: u64,
    errors: u64,
}

impl HostQueue {
    pub fn new(key: &str, pending: Box<dyn PendingQueue>, politeness: Politeness) -> Self {
        Self {
            key: key.to_string(),
            pending,
            in_flight: None,
            politeness,
            fetched: 0,
            errors: 0,
        }
    }

    pub fn politeness(&self) -> &Politeness {
        &self.politeness
    }

    /// Completed fetch attempts, including failures
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    #[cfg(test)]
    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns true if nothing is pending and no worker holds the queue
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    pub fn enqueue(&mut self, record: UriRecord) -> StorageResult<()> {
        self.pending.push_back(record)
    }

    /// Pops the head record and marks it as in flight
    pub fn take_head(&mut self) -> StorageResult<Option<UriRecord>> {
        let head = self.pending.pop_front()?;
        self.in_flight = head.clone();
        Ok(head)
    }

    /// Returns true if `record` is the record currently in flight
    pub fn holds(&self, record: &UriRecord) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|held| same_attempt(held, record))
    }

    /// Settles the in-flight record with the worker's outcome
    ///
    /// Returns `None` if nothing was in flight.
    pub fn complete(
        &mut self,
        outcome: &FetchOutcome,
        max_retries: u32,
    ) -> StorageResult<Option<Disposition>> {
        match self.in_flight.take() {
            Some(record) => self.settle(record, outcome, max_retries).map(Some),
            None => Ok(None),
        }
    }

    /// Applies a journaled finish to the head record during recovery
    ///
    /// The entry only applies if the head is the same URI at the same
    /// attempt count; anything else means the entry is already reflected.
    pub fn replay_finish(
        &mut self,
        record: &UriRecord,
        outcome: &FetchOutcome,
        max_retries: u32,
    ) -> StorageResult<Option<Disposition>> {
        let matches = self
            .pending
            .peek()?
            .is_some_and(|head| same_attempt(head, record));
        if !matches {
            return Ok(None);
        }

        match self.pending.pop_front()? {
            Some(head) => self.settle(head, outcome, max_retries).map(Some),
            None => Ok(None),
        }
    }

    fn settle(
        &mut self,
        mut record: UriRecord,
        outcome: &FetchOutcome,
        max_retries: u32,
    ) -> StorageResult<Disposition> {
        let prior_attempts = record.attempts;
        record.attempts += 1;
        record.last_status = outcome.status_code;

        self.fetched += 1;
        if !outcome.is_success() {
            self.errors += 1;
        }

        let disposition = match outcome.status {
            FetchStatus::Success => Disposition::Succeeded,
            FetchStatus::Transient if prior_attempts < max_retries => {
                let attempt = record.attempts;
                self.pending.push_back(record)?;
                Disposition::Retrying { attempt }
            }
            FetchStatus::Transient | FetchStatus::Permanent => Disposition::Failed,
        };

        Ok(disposition)
    }

    /// Copies the queue's records and totals for a checkpoint
    pub fn snapshot(&self) -> StorageResult<QueueSnapshot> {
        Ok(QueueSnapshot {
            key: self.key.clone(),
            fetched: self.fetched,
            errors: self.errors,
            in_flight: self.in_flight.clone(),
            pending: self.pending.snapshot()?,
        })
    }

    /// Restores fetch totals from a checkpoint
    pub fn restore_totals(&mut self, fetched: u64, errors: u64) {
        self.fetched = fetched;
        self.errors = errors;
    }
}

fn same_attempt(a: &UriRecord, b: &UriRecord) -> bool {
    a.canonical == b.canonical && a.attempts == b.attempts
}
