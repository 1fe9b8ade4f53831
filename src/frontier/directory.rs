//! Map from politeness key to its queue
//!
//! Lookups share a read lock. Creating or retiring a queue takes the write
//! lock, so exactly one caller creates a given key and no record can be
//! appended to a queue while it is being retired.

use crate::queue::HostQueue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

pub type SharedQueue = Arc<Mutex<HostQueue>>;

#[derive(Default)]
pub struct QueueDirectory {
    queues: RwLock<HashMap<String, SharedQueue>>,
}

impl QueueDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<SharedQueue> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Runs `f` on the queue for `key`, creating the queue if needed
    ///
    /// `f` receives the queue and whether this call created it. It runs
    /// while the directory lock is held, so the queue cannot be retired
    /// underneath it.
    pub fn with_queue<C, F, R>(&self, key: &str, create: C, f: F) -> R
    where
        C: FnOnce() -> HostQueue,
        F: FnOnce(&SharedQueue, bool) -> R,
    {
        {
            let queues = self.read();
            if let Some(queue) = queues.get(key) {
                return f(queue, false);
            }
        }

        let mut queues = self.write();
        if let Some(queue) = queues.get(key) {
            // Another caller created it between the two locks
            return f(queue, false);
        }

        let queue = Arc::new(Mutex::new(create()));
        queues.insert(key.to_string(), Arc::clone(&queue));
        debug!("Opened queue for {} ({} open)", key, queues.len());
        f(&queue, true)
    }

    /// Removes the queues named by `pick`, which runs under the write lock
    ///
    /// A queue that turns out not to be idle is kept. Returns the number of
    /// queues removed.
    pub fn retire<P>(&self, pick: P) -> usize
    where
        P: FnOnce() -> Vec<String>,
    {
        let mut queues = self.write();
        let mut removed = 0;

        for key in pick() {
            let idle = queues
                .get(&key)
                .is_some_and(|queue| crate::lock(queue).is_idle());
            if idle {
                queues.remove(&key);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Retired {} idle queues ({} open)", removed, queues.len());
        }
        removed
    }

    /// Every queue, ordered by key
    pub fn entries(&self) -> Vec<(String, SharedQueue)> {
        let mut entries: Vec<(String, SharedQueue)> = self
            .read()
            .iter()
            .map(|(key, queue)| (key.clone(), Arc::clone(queue)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SharedQueue>> {
        self.queues.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SharedQueue>> {
        self.queues.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::state::{Politeness, UriRecord};
    use std::time::Duration;

    fn keys(directory: &QueueDirectory) -> Vec<String> {
        directory.entries().into_iter().map(|(key, _)| key).collect()
    }

    fn new_queue(key: &str) -> HostQueue {
        let politeness = Politeness {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            delay_factor: 0.0,
        };
        HostQueue::new(key, Box::new(MemoryQueue::new()), politeness)
    }

    #[test]
    fn test_with_queue_creates_once() {
        let directory = QueueDirectory::new();

        let created = directory.with_queue("a.com", || new_queue("a.com"), |_, created| created);
        assert!(created);
        let created = directory.with_queue("a.com", || new_queue("a.com"), |_, created| created);
        assert!(!created);

        assert_eq!(directory.len(), 1);
        assert!(directory.contains("a.com"));
    }

    #[test]
    fn test_concurrent_creation_has_one_winner() {
        let directory = Arc::new(QueueDirectory::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let directory = Arc::clone(&directory);
                std::thread::spawn(move || {
                    directory.with_queue("a.com", || new_queue("a.com"), |_, created| created)
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_remove_only_idle_queues() {
        let directory = QueueDirectory::new();
        directory.with_queue("a.com", || new_queue("a.com"), |queue, _| {
            crate::lock(queue)
                .enqueue(UriRecord::seed("http://a.com/"))
                .unwrap();
        });
        directory.with_queue("b.com", || new_queue("b.com"), |_, _| ());

        let removed = directory.retire(|| {
            vec![
                "a.com".to_string(),
                "b.com".to_string(),
                "missing.com".to_string(),
            ]
        });
        assert_eq!(removed, 1);
        assert_eq!(keys(&directory), vec!["a.com".to_string()]);
    }

    #[test]
    fn test_entries_are_sorted() {
        let directory = QueueDirectory::new();
        for key in ["c.com", "a.com", "b.com"] {
            directory.with_queue(key, || new_queue(key), |_, _| ());
        }
        assert_eq!(keys(&directory), vec!["a.com", "b.com", "c.com"]);
    }
}
