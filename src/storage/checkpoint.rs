//! Point-in-time checkpoints
//!
//! A checkpoint directory holds:
//!
//! ```text
//! <dir>/queues/<escaped key>   JSON QueueSnapshot, one per politeness key
//! <dir>/fingerprints           "SFP1" then little-endian u64 fingerprints
//! <dir>/counters               JSON CheckpointManifest
//! <dir>/valid                  RFC 3339 timestamp, written last
//! ```
//!
//! A directory without `valid` is a torn checkpoint and is never loaded.
//! A catalogue directory holds many checkpoints as `cp-00001`, `cp-00002`,
//! and so on; the highest-numbered valid one is the newest.

use crate::fingerprint::FingerprintSet;
use crate::state::UriRecord;
use crate::storage::traits::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const VALID_FILE: &str = "valid";
const QUEUES_DIR: &str = "queues";
const FINGERPRINTS_FILE: &str = "fingerprints";
const COUNTERS_FILE: &str = "counters";
const FINGERPRINT_MAGIC: &[u8; 4] = b"SFP1";
const CATALOGUE_PREFIX: &str = "cp-";
const FINGERPRINT_BATCH: usize = 65_536;

/// Serialized contents of one per-key queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub key: String,
    pub fetched: u64,
    pub errors: u64,
    /// The record a worker held when the checkpoint was taken
    pub in_flight: Option<UriRecord>,
    pub pending: Vec<UriRecord>,
}

/// Frontier-wide counters as persisted in a checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub discovered: u64,
    pub duplicates: u64,
    pub out_of_scope: u64,
    pub capacity_rejected: u64,
    pub marked_seen: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}

/// Contents of the `counters` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub counters: CounterSnapshot,
    /// Sequence number of the last journal entry covered by this checkpoint
    pub journal_seq: u64,
    pub created_at: DateTime<Utc>,
    pub queue_count: usize,
    pub fingerprint_count: u64,
}

/// Writes one checkpoint directory
///
/// Files are written and synced in order, with `valid` last, so a crash at
/// any point leaves a directory that readers reject.
pub struct CheckpointWriter {
    dir: PathBuf,
    queue_count: usize,
}

impl CheckpointWriter {
    /// Prepares `dir`, invalidating any checkpoint already there
    pub fn begin(dir: &Path) -> StorageResult<Self> {
        let valid = dir.join(VALID_FILE);
        if valid.exists() {
            fs::remove_file(&valid)?;
            sync_dir(dir);
        }

        let queues = dir.join(QUEUES_DIR);
        if queues.exists() {
            fs::remove_dir_all(&queues)?;
        }
        fs::create_dir_all(&queues)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            queue_count: 0,
        })
    }

    pub fn write_queue(&mut self, snapshot: &QueueSnapshot) -> StorageResult<()> {
        let path = self.dir.join(QUEUES_DIR).join(escape_key(&snapshot.key));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, snapshot)?;
        finish_file(writer)?;
        self.queue_count += 1;
        Ok(())
    }

    /// Writes every fingerprint in the set, returning how many were written
    pub fn write_fingerprints(&mut self, set: &dyn FingerprintSet) -> StorageResult<u64> {
        let path = self.dir.join(FINGERPRINTS_FILE);
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(FINGERPRINT_MAGIC)?;

        let mut count = 0u64;
        set.export(&mut |fp| {
            count += 1;
            writer.write_all(&fp.to_le_bytes())
        })?;

        finish_file(writer)?;
        Ok(count)
    }

    /// Writes the manifest and then the validity stamp
    pub fn finish(self, manifest: &CheckpointManifest) -> StorageResult<PathBuf> {
        let mut writer = BufWriter::new(File::create(self.dir.join(COUNTERS_FILE))?);
        serde_json::to_writer_pretty(&mut writer, manifest)?;
        finish_file(writer)?;
        sync_dir(&self.dir.join(QUEUES_DIR));
        sync_dir(&self.dir);

        let tmp = self.dir.join("valid.tmp");
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(manifest.created_at.to_rfc3339().as_bytes())?;
        finish_file(writer)?;
        fs::rename(&tmp, self.dir.join(VALID_FILE))?;
        sync_dir(&self.dir);

        debug!(
            "Checkpoint stamped at {} ({} queues)",
            self.dir.display(),
            self.queue_count
        );
        Ok(self.dir)
    }
}

/// A stamped checkpoint directory opened for reading
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub path: PathBuf,
    pub stamped_at: DateTime<Utc>,
    pub manifest: CheckpointManifest,
}

impl Checkpoint {
    /// Opens a checkpoint, rejecting it if the stamp or manifest is missing
    pub fn open(dir: &Path) -> StorageResult<Self> {
        let stamp = fs::read_to_string(dir.join(VALID_FILE))
            .map_err(|e| corrupt(dir, format!("missing validity stamp: {}", e)))?;
        let stamped_at = DateTime::parse_from_rfc3339(stamp.trim())
            .map_err(|e| corrupt(dir, format!("bad validity stamp: {}", e)))?
            .with_timezone(&Utc);

        let counters = fs::read_to_string(dir.join(COUNTERS_FILE))
            .map_err(|e| corrupt(dir, format!("missing counters: {}", e)))?;
        let manifest: CheckpointManifest = serde_json::from_str(&counters)
            .map_err(|e| corrupt(dir, format!("bad counters: {}", e)))?;

        let fp_len = fs::metadata(dir.join(FINGERPRINTS_FILE))
            .map_err(|e| corrupt(dir, format!("missing fingerprints: {}", e)))?
            .len();
        if fp_len < 4 || (fp_len - 4) % 8 != 0 {
            return Err(corrupt(
                dir,
                format!("fingerprint file has invalid length {}", fp_len),
            ));
        }

        Ok(Self {
            path: dir.to_path_buf(),
            stamped_at,
            manifest,
        })
    }

    /// Reads every queue snapshot, ordered by file name
    pub fn queues(&self) -> StorageResult<Vec<QueueSnapshot>> {
        let queues_dir = self.path.join(QUEUES_DIR);
        let mut paths: Vec<PathBuf> = fs::read_dir(&queues_dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()?;
        paths.sort();

        paths
            .iter()
            .map(|path| {
                let reader = BufReader::new(File::open(path)?);
                serde_json::from_reader(reader)
                    .map_err(|e| corrupt(path, format!("bad queue snapshot: {}", e)))
            })
            .collect()
    }

    /// Streams fingerprints to `f` in batches, returning the total read
    pub fn read_fingerprints<F>(&self, mut f: F) -> StorageResult<u64>
    where
        F: FnMut(&[u64]) -> StorageResult<()>,
    {
        let path = self.path.join(FINGERPRINTS_FILE);
        let mut reader = BufReader::new(File::open(&path)?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != FINGERPRINT_MAGIC {
            return Err(corrupt(&path, "bad fingerprint file magic".to_string()));
        }

        let mut total = 0u64;
        let mut batch = Vec::with_capacity(FINGERPRINT_BATCH);
        let mut buf = [0u8; 8];
        loop {
            match reader.read_exact(&mut buf) {
                Ok(()) => batch.push(u64::from_le_bytes(buf)),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            if batch.len() == FINGERPRINT_BATCH {
                f(&batch)?;
                total += batch.len() as u64;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            f(&batch)?;
            total += batch.len() as u64;
        }

        Ok(total)
    }
}

/// Returns true if `dir` carries a validity stamp
pub fn is_stamped(dir: &Path) -> bool {
    dir.join(VALID_FILE).is_file()
}

/// Finds the checkpoint to recover from
///
/// A stamped `dir` is opened directly. Otherwise `dir` is treated as a
/// catalogue and its `cp-*` children are tried newest first; invalid ones
/// are logged and skipped. Returns `None` when nothing usable exists.
pub fn find_latest(dir: &Path) -> StorageResult<Option<Checkpoint>> {
    if is_stamped(dir) {
        return Checkpoint::open(dir).map(Some);
    }

    if !dir.is_dir() {
        return Ok(None);
    }

    let mut candidates = catalogue_entries(dir)?;
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in candidates {
        match Checkpoint::open(&path) {
            Ok(checkpoint) => return Ok(Some(checkpoint)),
            Err(e) => warn!("Skipping invalid checkpoint {}: {}", path.display(), e),
        }
    }

    Ok(None)
}

/// Opens the oldest valid checkpoint in a catalogue
///
/// Journal segments this checkpoint does not cover must be kept.
pub fn find_oldest(root: &Path) -> StorageResult<Option<Checkpoint>> {
    if !root.is_dir() {
        return Ok(None);
    }

    let mut candidates = catalogue_entries(root)?;
    candidates.sort_by_key(|(number, _)| *number);

    for (_, path) in candidates {
        if let Ok(checkpoint) = Checkpoint::open(&path) {
            return Ok(Some(checkpoint));
        }
    }
    Ok(None)
}

/// Returns true if `root` holds any `cp-*` entry, valid or torn
pub fn has_checkpoints(root: &Path) -> StorageResult<bool> {
    if !root.is_dir() {
        return Ok(false);
    }
    Ok(!catalogue_entries(root)?.is_empty())
}

/// Path for the next checkpoint in a catalogue directory
pub fn next_catalogue_dir(root: &Path) -> StorageResult<PathBuf> {
    fs::create_dir_all(root)?;
    let next = catalogue_entries(root)?
        .iter()
        .map(|(n, _)| *n)
        .max()
        .unwrap_or(0)
        + 1;
    Ok(root.join(format!("{}{:05}", CATALOGUE_PREFIX, next)))
}

fn catalogue_entries(root: &Path) -> StorageResult<Vec<(u64, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(number) = name
            .to_str()
            .and_then(|n| n.strip_prefix(CATALOGUE_PREFIX))
            .and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        if entry.path().is_dir() {
            entries.push((number, entry.path()));
        }
    }
    Ok(entries)
}

/// Escapes a queue key into a portable file name
///
/// Alphanumerics, `.`, `-` and `_` are kept; every other byte becomes `%XX`.
pub fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn finish_file(mut writer: BufWriter<File>) -> StorageResult<()> {
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        if let Err(e) = handle.sync_all() {
            warn!("Failed to sync directory {}: {}", dir.display(), e);
        }
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

fn corrupt(path: &Path, reason: String) -> StorageError {
    StorageError::Corrupt {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::MemoryFingerprintSet;
    use tempfile::TempDir;

    fn manifest() -> CheckpointManifest {
        CheckpointManifest {
            counters: CounterSnapshot {
                discovered: 3,
                succeeded: 1,
                ..CounterSnapshot::default()
            },
            journal_seq: 7,
            created_at: Utc::now(),
            queue_count: 1,
            fingerprint_count: 2,
        }
    }

    fn snapshot(key: &str) -> QueueSnapshot {
        QueueSnapshot {
            key: key.to_string(),
            fetched: 1,
            errors: 0,
            in_flight: None,
            pending: vec![UriRecord::seed(format!("http://{}/", key))],
        }
    }

    fn write_checkpoint(dir: &Path) {
        let set = MemoryFingerprintSet::new();
        set.import(&[1, u64::MAX]).unwrap();

        let mut writer = CheckpointWriter::begin(dir).unwrap();
        writer.write_queue(&snapshot("a.com:8080")).unwrap();
        writer.write_fingerprints(&set).unwrap();
        writer.finish(&manifest()).unwrap();
    }

    #[test]
    fn test_escape_key() {
        assert_eq!(escape_key("example.com"), "example.com");
        assert_eq!(escape_key("example.com:8080"), "example.com%3A8080");
        assert_eq!(escape_key("[::1]"), "%5B%3A%3A1%5D");
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        write_checkpoint(temp.path());

        let checkpoint = Checkpoint::open(temp.path()).unwrap();
        assert_eq!(checkpoint.manifest.journal_seq, 7);
        assert_eq!(checkpoint.manifest.counters.discovered, 3);
        assert_eq!(checkpoint.queues().unwrap(), vec![snapshot("a.com:8080")]);

        let mut fps = Vec::new();
        let total = checkpoint
            .read_fingerprints(|batch| {
                fps.extend_from_slice(batch);
                Ok(())
            })
            .unwrap();
        fps.sort_unstable();
        assert_eq!(total, 2);
        assert_eq!(fps, vec![1, u64::MAX]);
    }

    #[test]
    fn test_unstamped_directory_rejected() {
        let temp = TempDir::new().unwrap();
        write_checkpoint(temp.path());
        fs::remove_file(temp.path().join(VALID_FILE)).unwrap();

        assert!(matches!(
            Checkpoint::open(temp.path()),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_truncated_fingerprints_rejected() {
        let temp = TempDir::new().unwrap();
        write_checkpoint(temp.path());
        let path = temp.path().join(FINGERPRINTS_FILE);
        let len = fs::metadata(&path).unwrap().len();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 3)
            .unwrap();

        assert!(Checkpoint::open(temp.path()).is_err());
    }

    #[test]
    fn test_rewrite_invalidates_old_stamp_first() {
        let temp = TempDir::new().unwrap();
        write_checkpoint(temp.path());

        let _writer = CheckpointWriter::begin(temp.path()).unwrap();
        assert!(!is_stamped(temp.path()));
    }

    #[test]
    fn test_catalogue_picks_newest_valid() {
        let temp = TempDir::new().unwrap();
        let first = next_catalogue_dir(temp.path()).unwrap();
        write_checkpoint(&first);
        let second = next_catalogue_dir(temp.path()).unwrap();
        write_checkpoint(&second);
        assert!(second.ends_with("cp-00002"));

        // A torn third checkpoint
        let third = next_catalogue_dir(temp.path()).unwrap();
        fs::create_dir_all(third.join(QUEUES_DIR)).unwrap();

        let found = find_latest(temp.path()).unwrap().unwrap();
        assert_eq!(found.path, second);

        // Corrupt the second: falls back to the first
        fs::remove_file(second.join(VALID_FILE)).unwrap();
        let found = find_latest(temp.path()).unwrap().unwrap();
        assert_eq!(found.path, first);
    }

    #[test]
    fn test_empty_catalogue_finds_nothing() {
        let temp = TempDir::new().unwrap();
        assert!(find_latest(temp.path()).unwrap().is_none());
        assert!(find_latest(&temp.path().join("missing")).unwrap().is_none());
        assert!(find_oldest(temp.path()).unwrap().is_none());
        assert!(!has_checkpoints(temp.path()).unwrap());
        assert!(!has_checkpoints(&temp.path().join("missing")).unwrap());
    }

    #[test]
    fn test_catalogue_picks_oldest_valid() {
        let temp = TempDir::new().unwrap();

        // A torn first checkpoint still counts as catalogue content
        let torn = next_catalogue_dir(temp.path()).unwrap();
        fs::create_dir_all(torn.join(QUEUES_DIR)).unwrap();
        assert!(has_checkpoints(temp.path()).unwrap());
        assert!(find_oldest(temp.path()).unwrap().is_none());

        let second = next_catalogue_dir(temp.path()).unwrap();
        write_checkpoint(&second);
        let third = next_catalogue_dir(temp.path()).unwrap();
        write_checkpoint(&third);

        let found = find_oldest(temp.path()).unwrap().unwrap();
        assert_eq!(found.path, second);
    }
}
