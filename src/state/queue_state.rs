use std::fmt;

/// Scheduling state of one per-key queue
///
/// ```text
/// EMPTY -> READY -> BUSY -> READY | SNOOZED | EMPTY
///          SNOOZED -> READY (once the wake time passes)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
    /// No pending records and no worker holds the queue
    Empty,
    /// Pending records, wake time reached, no holder
    Ready,
    /// Pending records, waiting out the politeness delay
    Snoozed,
    /// A worker holds the queue's head record
    Busy,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Ready => "ready",
            Self::Snoozed => "snoozed",
            Self::Busy => "busy",
        }
    }

    /// Returns true if the queue still has work queued or in flight
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Empty)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
