//! Frontier statistics
//!
//! Statistics come either from a live frontier (`Frontier::stats`) or from
//! a checkpoint on disk, and are printed in the same format.

use crate::storage::{Checkpoint, StorageResult};

/// Snapshot of frontier totals and queue states
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierStats {
    /// Records offered to `schedule()`
    pub discovered: u64,

    /// Records waiting in queues
    pub queued: u64,

    /// Records handed to a worker and not yet finished
    pub in_flight: u64,

    pub duplicates: u64,
    pub out_of_scope: u64,
    pub capacity_rejected: u64,
    pub marked_seen: u64,

    /// Fetches finished successfully
    pub succeeded: u64,

    /// Fetches that failed for good
    pub failed: u64,

    /// Transient failures put back for another attempt
    pub retried: u64,

    pub busy_hosts: usize,
    pub open_queues: usize,
    pub ready_queues: usize,
    pub snoozed_queues: usize,
    pub empty_queues: usize,

    /// Canonical URIs recorded as seen
    pub fingerprints: u64,

    pub paused: bool,
    pub terminated: bool,
}

impl FrontierStats {
    /// Records that reached a final disposition
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Share of finished records that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        let finished = self.finished();
        if finished > 0 {
            (self.succeeded as f64 / finished as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Loads statistics from a stamped checkpoint
///
/// Queue states are reported as recovery would restore them: queues with
/// records are ready, the rest are empty. Records in flight at checkpoint
/// time count as queued, since recovery puts them back.
pub fn checkpoint_statistics(checkpoint: &Checkpoint) -> StorageResult<FrontierStats> {
    let counters = &checkpoint.manifest.counters;
    let queues = checkpoint.queues()?;

    let mut stats = FrontierStats {
        discovered: counters.discovered,
        duplicates: counters.duplicates,
        out_of_scope: counters.out_of_scope,
        capacity_rejected: counters.capacity_rejected,
        marked_seen: counters.marked_seen,
        succeeded: counters.succeeded,
        failed: counters.failed,
        retried: counters.retried,
        open_queues: queues.len(),
        fingerprints: checkpoint.manifest.fingerprint_count,
        ..FrontierStats::default()
    };

    for queue in &queues {
        let held = queue.pending.len() as u64 + u64::from(queue.in_flight.is_some());
        stats.queued += held;
        if held > 0 {
            stats.ready_queues += 1;
        } else {
            stats.empty_queues += 1;
        }
    }

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &FrontierStats) {
    println!("=== Frontier Statistics ===\n");

    println!("Overview:");
    println!("  Discovered: {}", stats.discovered);
    println!("  Queued: {}", stats.queued);
    println!("  In flight: {}", stats.in_flight);
    println!("  Fingerprints: {}", stats.fingerprints);
    if stats.paused {
        println!("  Paused");
    }
    if stats.terminated {
        println!("  Terminated");
    }
    println!();

    println!("Rejected:");
    println!("  Duplicates: {}", stats.duplicates);
    println!("  Out of scope: {}", stats.out_of_scope);
    println!("  Over capacity: {}", stats.capacity_rejected);
    println!("  Marked seen: {}", stats.marked_seen);
    println!();

    println!("Queues ({} open):", stats.open_queues);
    println!("  Ready: {}", stats.ready_queues);
    println!("  Snoozed: {}", stats.snoozed_queues);
    println!("  Busy: {}", stats.busy_hosts);
    println!("  Empty: {}", stats.empty_queues);
    println!();

    println!("Fetches:");
    println!("  Succeeded: {}", stats.succeeded);
    println!("  Failed: {}", stats.failed);
    println!("  Retried: {}", stats.retried);
    println!();

    println!(
        "Success Rate: {:.1}% ({} / {} records finished successfully)",
        stats.success_rate(),
        stats.succeeded,
        stats.finished()
    );
}
