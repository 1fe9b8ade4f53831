//! The crawl frontier and its scheduling core
//!
//! # Components
//!
//! - [`Frontier`]: the facade workers and link extractors talk to
//! - `QueueDirectory`: politeness key to per-key queue map
//! - [`ReadySet`]: READY/SNOOZED/BUSY/EMPTY state of every key
//! - [`run_workers`]: a pool of async workers driving a [`Fetcher`]
//!
//! # Lock order
//!
//! Directory, then a queue, then the ready set. The journal and the work
//! database are leaves and are never held while taking another lock.

mod coordinator;
mod counters;
mod directory;
mod scheduler;
mod worker;

pub use coordinator::{Frontier, ReplayReport};
pub use directory::QueueDirectory;
pub use scheduler::{ReadySet, SelectionPolicy, StateCounts};
pub use worker::{run_workers, FetchReport, Fetcher, WorkerSummary};

use crate::state::UriRecord;
use crate::url::ScopeRejection;
use std::fmt;

/// What `next()` hands a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Fetch this record, then report it through `finished()`
    Fetch(UriRecord),
    /// Nothing is queued and nothing is in flight
    Ended,
    /// `terminate()` was called
    ShuttingDown,
}

/// Result of offering a record to `schedule()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Accepted,
    /// The canonical URI was seen before
    Duplicate,
    OutOfScope(ScopeRejection),
    /// A global cap was hit; the record was not recorded as seen
    CapacityExceeded(CapacityLimit),
    /// The fingerprint was recorded without queueing the record
    MarkedSeen,
}

impl ScheduleOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Which global cap rejected a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityLimit {
    QueuedUris,
    OpenQueues,
}

impl fmt::Display for CapacityLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueuedUris => write!(f, "max-queued-uris"),
            Self::OpenQueues => write!(f, "max-open-queues"),
        }
    }
}
