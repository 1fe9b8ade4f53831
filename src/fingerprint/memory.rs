use crate::fingerprint::FingerprintSet;
use crate::lock;
use crate::storage::StorageResult;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const SHARDS: usize = 16;

/// In-memory fingerprint set
///
/// Fingerprints are spread over independently locked shards so that
/// concurrent `schedule()` callers rarely contend.
pub struct MemoryFingerprintSet {
    shards: Vec<Mutex<HashSet<u64>>>,
    count: AtomicU64,
}

impl MemoryFingerprintSet {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashSet::new())).collect(),
            count: AtomicU64::new(0),
        }
    }

    fn shard(&self, fp: u64) -> &Mutex<HashSet<u64>> {
        &self.shards[(fp % SHARDS as u64) as usize]
    }
}

impl Default for MemoryFingerprintSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintSet for MemoryFingerprintSet {
    fn contains(&self, fp: u64) -> StorageResult<bool> {
        Ok(lock(self.shard(fp)).contains(&fp))
    }

    fn add_if_absent(&self, fp: u64) -> StorageResult<bool> {
        let inserted = lock(self.shard(fp)).insert(fp);
        if inserted {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(inserted)
    }

    fn len(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn export(&self, sink: &mut dyn FnMut(u64) -> std::io::Result<()>) -> StorageResult<()> {
        for shard in &self.shards {
            let guard = lock(shard);
            for fp in guard.iter() {
                sink(*fp)?;
            }
        }
        Ok(())
    }

    fn import(&self, fps: &[u64]) -> StorageResult<()> {
        for fp in fps {
            self.add_if_absent(*fp)?;
        }
        Ok(())
    }
}
