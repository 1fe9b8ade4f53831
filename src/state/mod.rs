//! State module for the records and queues the frontier tracks
//!
//! # Components
//!
//! - `UriRecord`: one candidate or in-flight fetch target, with its hops path
//! - `FetchOutcome`: what a worker reports back through `finished()`
//! - `QueueState`: the scheduling state of one per-key queue
//! - `Politeness`: the resolved delay settings for one key

mod outcome;
mod politeness;
mod queue_state;
mod uri_record;

// Re-export main types
pub use outcome::{Disposition, FetchOutcome, FetchStatus};
pub use politeness::Politeness;
pub use queue_state::QueueState;
pub use uri_record::{Directive, Hop, UriRecord};
