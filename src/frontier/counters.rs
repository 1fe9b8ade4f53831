use crate::storage::CounterSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};

/// Frontier-wide event totals
#[derive(Debug, Default)]
pub struct Counters {
    pub discovered: AtomicU64,
    pub duplicates: AtomicU64,
    pub out_of_scope: AtomicU64,
    pub capacity_rejected: AtomicU64,
    pub marked_seen: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            discovered: self.discovered.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            out_of_scope: self.out_of_scope.load(Ordering::Relaxed),
            capacity_rejected: self.capacity_rejected.load(Ordering::Relaxed),
            marked_seen: self.marked_seen.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }

    pub fn restore(&self, snapshot: &CounterSnapshot) {
        self.discovered.store(snapshot.discovered, Ordering::Relaxed);
        self.duplicates.store(snapshot.duplicates, Ordering::Relaxed);
        self.out_of_scope
            .store(snapshot.out_of_scope, Ordering::Relaxed);
        self.capacity_rejected
            .store(snapshot.capacity_rejected, Ordering::Relaxed);
        self.marked_seen.store(snapshot.marked_seen, Ordering::Relaxed);
        self.succeeded.store(snapshot.succeeded, Ordering::Relaxed);
        self.failed.store(snapshot.failed, Ordering::Relaxed);
        self.retried.store(snapshot.retried, Ordering::Relaxed);
    }
}
