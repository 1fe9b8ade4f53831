//! Ready-set scheduler for per-key queues
//!
//! This module handles:
//! - The EMPTY/READY/SNOOZED/BUSY state of every live key
//! - Choosing the next READY key (round-robin or least-fetched)
//! - Waking SNOOZED keys once their politeness delay has passed
//! - Finding EMPTY keys whose delay has passed so they can be retired
//!
//! Heap and deque entries are never removed in place. An entry whose key
//! has since moved to another state (or another wake time) is stale and is
//! skipped when it reaches the front.

use crate::state::QueueState;
use serde::Deserialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// How the next READY queue is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Keys take turns in the order they became ready
    RoundRobin,
    /// The ready key with the fewest completed fetches goes first
    LeastFetched,
}

#[derive(Debug, Clone)]
struct Slot {
    state: QueueState,
    /// Earliest instant the next fetch from this key may start
    wake_at: Option<Instant>,
    pending: usize,
    fetched: u64,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: QueueState::Empty,
            wake_at: None,
            pending: 0,
            fetched: 0,
        }
    }
}

/// Number of keys in each scheduling state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub empty: usize,
    pub ready: usize,
    pub snoozed: usize,
    pub busy: usize,
}

/// What a key turns into after a state change
enum Transition {
    Ready,
    Snoozed(Instant),
    Empty(Instant),
    Unchanged,
}

/// Scheduling state for every live key
pub struct ReadySet {
    policy: SelectionPolicy,
    /// Cap on keys held by workers at once (0 = unlimited)
    max_busy: usize,
    slots: HashMap<String, Slot>,
    ready: VecDeque<String>,
    ranked: BinaryHeap<Reverse<(u64, u64, String)>>,
    snoozed: BinaryHeap<Reverse<(Instant, String)>>,
    retiring: BinaryHeap<Reverse<(Instant, String)>>,
    arrivals: u64,
    busy: usize,
    pending_total: u64,
}

impl ReadySet {
    pub fn new(policy: SelectionPolicy, max_busy: usize) -> Self {
        Self {
            policy,
            max_busy,
            slots: HashMap::new(),
            ready: VecDeque::new(),
            ranked: BinaryHeap::new(),
            snoozed: BinaryHeap::new(),
            retiring: BinaryHeap::new(),
            arrivals: 0,
            busy: 0,
            pending_total: 0,
        }
    }

    /// Starts tracking a newly created key in the EMPTY state
    pub fn register(&mut self, key: &str, now: Instant) {
        if self.slots.contains_key(key) {
            return;
        }
        self.slots.insert(key.to_string(), Slot::new());
        self.retiring.push(Reverse((now, key.to_string())));
    }

    /// Sets the fetch total used by least-fetched selection
    pub fn restore_fetched(&mut self, key: &str, fetched: u64) {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.fetched = fetched;
        }
    }

    /// Accounts for one record appended to `key`'s queue
    ///
    /// Returns true if the key left EMPTY, which is when waiting workers
    /// need to re-examine the ready set.
    pub fn enqueued(&mut self, key: &str, now: Instant) -> bool {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(Slot::new);
        slot.pending += 1;
        self.pending_total += 1;

        let transition = match slot.state {
            QueueState::Empty => match slot.wake_at {
                Some(wake) if wake > now => Transition::Snoozed(wake),
                _ => Transition::Ready,
            },
            _ => Transition::Unchanged,
        };

        let changed = !matches!(transition, Transition::Unchanged);
        self.apply(key, transition);
        changed
    }

    /// Picks the next READY key and marks it BUSY
    ///
    /// The caller must pop the key's head record next, or call `unselect`
    /// if that fails.
    pub fn select(&mut self, now: Instant) -> Option<String> {
        if self.max_busy > 0 && self.busy >= self.max_busy {
            return None;
        }

        self.promote_due(now);
        let key = self.pop_ready()?;

        let slot = self.slots.get_mut(&key)?;
        slot.state = QueueState::Busy;
        slot.pending = slot.pending.saturating_sub(1);
        self.busy += 1;
        self.pending_total = self.pending_total.saturating_sub(1);

        trace!("Selected {} ({} pending behind it)", key, slot.pending);
        Some(key)
    }

    /// Returns a selected key to the front of the ready set
    pub fn unselect(&mut self, key: &str) {
        let Some(slot) = self.slots.get_mut(key) else {
            return;
        };
        if slot.state != QueueState::Busy {
            return;
        }

        slot.state = QueueState::Ready;
        slot.pending += 1;
        self.busy = self.busy.saturating_sub(1);
        self.pending_total += 1;

        match self.policy {
            SelectionPolicy::RoundRobin => self.ready.push_front(key.to_string()),
            SelectionPolicy::LeastFetched => self.push_ready(key.to_string()),
        }
    }

    /// Releases a BUSY key after its fetch completed
    ///
    /// The key may not start another fetch before `now + delay`. A requeued
    /// record counts as pending again.
    pub fn release(
        &mut self,
        key: &str,
        now: Instant,
        delay: Duration,
        requeued: bool,
        fetched: u64,
    ) {
        let Some(slot) = self.slots.get_mut(key) else {
            return;
        };
        if slot.state != QueueState::Busy {
            return;
        }

        self.busy = self.busy.saturating_sub(1);
        if requeued {
            slot.pending += 1;
            self.pending_total += 1;
        }
        slot.fetched = fetched;

        let wake = now + delay;
        slot.wake_at = Some(wake);

        let transition = if slot.pending == 0 {
            Transition::Empty(wake)
        } else if delay.is_zero() {
            Transition::Ready
        } else {
            Transition::Snoozed(wake)
        };
        self.apply(key, transition);
    }

    /// Applies a journaled finish to a key that no worker holds
    pub fn replay_finished(&mut self, key: &str, now: Instant, requeued: bool, fetched: u64) {
        let Some(slot) = self.slots.get_mut(key) else {
            return;
        };

        slot.pending = slot.pending.saturating_sub(1);
        self.pending_total = self.pending_total.saturating_sub(1);
        if requeued {
            slot.pending += 1;
            self.pending_total += 1;
        }
        slot.fetched = fetched;

        let transition = if slot.pending == 0 && slot.state != QueueState::Busy {
            Transition::Empty(now)
        } else {
            Transition::Unchanged
        };
        self.apply(key, transition);
    }

    /// Removes and returns EMPTY keys whose politeness delay has passed
    ///
    /// The caller must drop the matching queues before anything else can
    /// schedule into them.
    pub fn take_retirements(&mut self, now: Instant) -> Vec<String> {
        let mut retired = Vec::new();

        while let Some(Reverse((due, _))) = self.retiring.peek() {
            if *due > now {
                break;
            }
            let Some(Reverse((_, key))) = self.retiring.pop() else {
                break;
            };

            let idle = self.slots.get(&key).is_some_and(|slot| {
                slot.state == QueueState::Empty
                    && slot.pending == 0
                    && slot.wake_at.map_or(true, |wake| wake <= now)
            });
            if idle {
                self.slots.remove(&key);
                retired.push(key);
            }
        }

        retired
    }

    /// Returns true if `take_retirements` may have work to do
    pub fn has_due_retirements(&self, now: Instant) -> bool {
        self.retiring
            .peek()
            .is_some_and(|Reverse((due, _))| *due <= now)
    }

    /// Earliest instant a SNOOZED key becomes READY
    pub fn next_wake(&self) -> Option<Instant> {
        self.snoozed.peek().map(|Reverse((wake, _))| *wake)
    }

    pub fn state_of(&self, key: &str) -> Option<QueueState> {
        self.slots.get(key).map(|slot| slot.state)
    }

    /// Number of keys currently held by workers
    pub fn busy(&self) -> usize {
        self.busy
    }

    /// Records queued across all keys, excluding records in flight
    pub fn pending_total(&self) -> u64 {
        self.pending_total
    }

    /// Returns true if nothing is queued and nothing is in flight
    pub fn is_exhausted(&self) -> bool {
        self.pending_total == 0 && self.busy == 0
    }

    pub fn counts(&self) -> StateCounts {
        self.slots
            .values()
            .fold(StateCounts::default(), |mut counts, slot| {
                match slot.state {
                    QueueState::Empty => counts.empty += 1,
                    QueueState::Ready => counts.ready += 1,
                    QueueState::Snoozed => counts.snoozed += 1,
                    QueueState::Busy => counts.busy += 1,
                }
                counts
            })
    }

    fn apply(&mut self, key: &str, transition: Transition) {
        let Some(slot) = self.slots.get_mut(key) else {
            return;
        };

        match transition {
            Transition::Ready => {
                slot.state = QueueState::Ready;
                self.push_ready(key.to_string());
            }
            Transition::Snoozed(wake) => {
                slot.state = QueueState::Snoozed;
                self.snoozed.push(Reverse((wake, key.to_string())));
            }
            Transition::Empty(due) => {
                slot.state = QueueState::Empty;
                self.retiring.push(Reverse((due, key.to_string())));
            }
            Transition::Unchanged => {}
        }
    }

    fn push_ready(&mut self, key: String) {
        match self.policy {
            SelectionPolicy::RoundRobin => self.ready.push_back(key),
            SelectionPolicy::LeastFetched => {
                let fetched = self.slots.get(&key).map_or(0, |slot| slot.fetched);
                self.arrivals += 1;
                self.ranked.push(Reverse((fetched, self.arrivals, key)));
            }
        }
    }

    fn pop_ready(&mut self) -> Option<String> {
        loop {
            let key = match self.policy {
                SelectionPolicy::RoundRobin => self.ready.pop_front()?,
                SelectionPolicy::LeastFetched => self.ranked.pop()?.0 .2,
            };
            let current = self
                .slots
                .get(&key)
                .is_some_and(|slot| slot.state == QueueState::Ready);
            if current {
                return Some(key);
            }
        }
    }

    /// Moves every SNOOZED key whose wake time has passed to READY
    fn promote_due(&mut self, now: Instant) {
        while let Some(Reverse((wake, _))) = self.snoozed.peek() {
            if *wake > now {
                break;
            }
            let Some(Reverse((wake, key))) = self.snoozed.pop() else {
                break;
            };

            let current = self.slots.get(&key).is_some_and(|slot| {
                slot.state == QueueState::Snoozed && slot.wake_at == Some(wake)
            });
            if current {
                trace!("Woke {}", key);
                self.apply(&key, Transition::Ready);
            }
        }
    }
}
