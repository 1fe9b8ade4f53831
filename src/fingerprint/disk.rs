use crate::fingerprint::FingerprintSet;
use crate::lock;
use crate::storage::{SqliteStorage, Storage, StorageResult};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Disk-backed fingerprint set
///
/// Every fingerprint is written through to the `fingerprints` table of the
/// work database. A bounded LRU holds recently seen fingerprints so that
/// repeated hits on popular URIs skip the database entirely. Cold entries
/// live only on disk, so membership never depends on the cache size.
pub struct DiskFingerprintSet {
    storage: Arc<Mutex<SqliteStorage>>,
    hot: Mutex<LruCache<u64, ()>>,
    count: AtomicU64,
}

impl DiskFingerprintSet {
    /// Creates a set over the given work database
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared handle to the work database
    /// * `cache_size` - Maximum number of hot fingerprints kept in memory
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, cache_size: usize) -> StorageResult<Self> {
        let count = lock(&storage).count_fingerprints()?;
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);

        debug!(
            "Disk fingerprint set opened with {} entries, cache of {}",
            count, capacity
        );

        Ok(Self {
            storage,
            hot: Mutex::new(LruCache::new(capacity)),
            count: AtomicU64::new(count),
        })
    }
}

impl FingerprintSet for DiskFingerprintSet {
    fn contains(&self, fp: u64) -> StorageResult<bool> {
        let mut hot = lock(&self.hot);
        if hot.get(&fp).is_some() {
            return Ok(true);
        }

        let found = lock(&self.storage).contains_fingerprint(fp)?;
        if found {
            hot.put(fp, ());
        }
        Ok(found)
    }

    fn add_if_absent(&self, fp: u64) -> StorageResult<bool> {
        // The cache lock is held across the insert so that racing callers
        // serialize on the same fingerprint.
        let mut hot = lock(&self.hot);
        if hot.get(&fp).is_some() {
            return Ok(false);
        }

        let inserted = lock(&self.storage).insert_fingerprint(fp)?;
        hot.put(fp, ());
        if inserted {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(inserted)
    }

    fn len(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn export(&self, sink: &mut dyn FnMut(u64) -> std::io::Result<()>) -> StorageResult<()> {
        lock(&self.storage).export_fingerprints(sink)
    }

    fn import(&self, fps: &[u64]) -> StorageResult<()> {
        let _hot = lock(&self.hot);
        let mut storage = lock(&self.storage);
        storage.insert_fingerprints(fps)?;
        self.count
            .store(storage.count_fingerprints()?, Ordering::Relaxed);
        Ok(())
    }
}
