//! Fingerprint sets for duplicate detection
//!
//! A fingerprint is the first 64 bits of the SHA-256 of a canonical URI.
//! Two implementations are provided, selected by configuration:
//!
//! - [`MemoryFingerprintSet`]: sharded in-memory hash sets
//! - [`DiskFingerprintSet`]: an LRU of hot entries in front of the SQLite
//!   work database

mod disk;
mod memory;

pub use disk::DiskFingerprintSet;
pub use memory::MemoryFingerprintSet;

use crate::storage::StorageResult;
use sha2::{Digest, Sha256};

/// Computes the 64-bit fingerprint of a canonical URI
///
/// # Examples
///
/// ```
/// use sumi_frontier::fingerprint::fingerprint;
///
/// assert_eq!(fingerprint("http://example.com/"), fingerprint("http://example.com/"));
/// assert_ne!(fingerprint("http://example.com/"), fingerprint("http://example.com/a"));
/// ```
pub fn fingerprint(canonical: &str) -> u64 {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// A concurrent set of URI fingerprints
///
/// `add_if_absent` is atomic per fingerprint: when many callers race to add
/// the same value, exactly one of them observes `true`. Entries are never
/// removed.
pub trait FingerprintSet: Send + Sync {
    /// Returns true if the fingerprint has been added
    fn contains(&self, fp: u64) -> StorageResult<bool>;

    /// Adds the fingerprint, returning true if it was not already present
    fn add_if_absent(&self, fp: u64) -> StorageResult<bool>;

    /// Number of fingerprints held
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Streams every fingerprint to `sink`, in no particular order
    fn export(&self, sink: &mut dyn FnMut(u64) -> std::io::Result<()>) -> StorageResult<()>;

    /// Adds many fingerprints at once
    fn import(&self, fps: &[u64]) -> StorageResult<()>;

    fn contains_uri(&self, canonical: &str) -> StorageResult<bool> {
        self.contains(fingerprint(canonical))
    }
}
