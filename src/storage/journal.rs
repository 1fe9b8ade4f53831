//! Write-ahead journal of schedule and finish events
//!
//! Each entry is one JSON line:
//!
//! ```text
//! {"seq":1,"at":"2024-05-01T12:00:00Z","op":"schedule","record":{...}}
//! {"seq":2,"at":"2024-05-01T12:00:03Z","op":"finish","record":{...},"outcome":{...}}
//! ```
//!
//! Sequence numbers increase by one per entry and continue across
//! restarts, so a checkpoint can name the last entry it already covers.
//!
//! Each checkpoint seals the live file as a segment named after the last
//! sequence number it holds (`frontier.journal.00000000000000000042`) and
//! starts an empty one. Recovery reads only the segments and entries past
//! the checkpoint it starts from.

use crate::config::JournalSync;
use crate::state::{FetchOutcome, UriRecord};
use crate::storage::traits::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One journaled event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub op: JournalOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum JournalOp {
    /// A record was accepted (or marked seen)
    Schedule { record: UriRecord },
    /// A worker reported the outcome of a fetch of `record`
    Finish {
        record: UriRecord,
        outcome: FetchOutcome,
    },
}

/// Append-only journal file
pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    sync: JournalSync,
    sync_every: u32,
    unsynced: u32,
    last_seq: u64,
    /// Entries in the live file since it was created or last sealed
    segment_entries: u64,
}

impl Journal {
    /// Creates an empty journal, truncating any existing file
    ///
    /// Sealed segments left by an earlier run are deleted.
    pub fn create(path: &Path, sync: JournalSync, sync_every: u32) -> StorageResult<Self> {
        create_parent(path)?;
        for (_, segment) in sealed_segments(path)? {
            fs::remove_file(&segment)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.sync_all()?;

        Ok(Self::from_file(path, file, sync, sync_every, 0, 0))
    }

    /// Opens an existing journal for appending
    ///
    /// Returns the entries numbered after `after_seq`, read from the sealed
    /// segments that can hold them and then from the live file. Entries at
    /// or below `after_seq` are never collected. A torn final line is cut
    /// off the live file before any new entry is appended, and numbering
    /// continues after both the last entry found and `after_seq`.
    pub fn open_append(
        path: &Path,
        sync: JournalSync,
        sync_every: u32,
        after_seq: u64,
    ) -> StorageResult<(Self, Vec<JournalEntry>)> {
        create_parent(path)?;

        let mut entries = Vec::new();
        let mut last_seq = after_seq;
        let mut collect = |entry: JournalEntry| {
            if entry.seq > after_seq {
                entries.push(entry);
            }
        };

        for (sealed_seq, segment) in sealed_segments(path)? {
            last_seq = last_seq.max(sealed_seq);
            if sealed_seq > after_seq {
                scan(&segment, &mut collect)?;
            }
        }

        let live = if path.exists() {
            scan(path, &mut collect)?
        } else {
            Scan::default()
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() > live.valid_len {
            warn!(
                "Truncating torn journal tail at byte {} in {}",
                live.valid_len,
                path.display()
            );
            file.set_len(live.valid_len)?;
            file.sync_all()?;
        }

        let last_seq = live.last_seq.unwrap_or(0).max(last_seq);

        debug!(
            "Opened journal {} with {} entries to replay, next seq {}",
            path.display(),
            entries.len(),
            last_seq + 1
        );

        Ok((
            Self::from_file(path, file, sync, sync_every, last_seq, live.count),
            entries,
        ))
    }

    fn from_file(
        path: &Path,
        file: File,
        sync: JournalSync,
        sync_every: u32,
        last_seq: u64,
        segment_entries: u64,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            sync,
            sync_every: sync_every.max(1),
            unsynced: 0,
            last_seq,
            segment_entries,
        }
    }

    pub fn log_schedule(&mut self, record: &UriRecord) -> StorageResult<u64> {
        self.append(JournalOp::Schedule {
            record: record.clone(),
        })
    }

    pub fn log_finish(&mut self, record: &UriRecord, outcome: &FetchOutcome) -> StorageResult<u64> {
        self.append(JournalOp::Finish {
            record: record.clone(),
            outcome: outcome.clone(),
        })
    }

    fn append(&mut self, op: JournalOp) -> StorageResult<u64> {
        let entry = JournalEntry {
            seq: self.last_seq + 1,
            at: Utc::now(),
            op,
        };

        serde_json::to_writer(&mut self.writer, &entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        self.unsynced += 1;
        let due = match self.sync {
            JournalSync::Always => true,
            JournalSync::Batched => self.unsynced >= self.sync_every,
        };
        if due {
            self.sync()?;
        }

        self.last_seq = entry.seq;
        self.segment_entries += 1;
        Ok(entry.seq)
    }

    /// Forces every appended entry to stable storage
    pub fn sync(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Seals the live file as a segment and starts an empty one
    ///
    /// Returns the sealed segment, or `None` if nothing was appended since
    /// the last rotation. On error the journal must not be written again.
    pub fn rotate(&mut self) -> StorageResult<Option<PathBuf>> {
        if self.segment_entries == 0 {
            return Ok(None);
        }
        self.sync()?;

        let sealed = segment_path(&self.path, self.last_seq);
        fs::rename(&self.path, &sealed)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;
        self.writer = BufWriter::new(file);
        self.segment_entries = 0;

        debug!("Sealed journal segment {}", sealed.display());
        Ok(Some(sealed))
    }

    /// Sequence number of the last entry written
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }
}

/// Path of the sealed segment whose last entry is `last_seq`
pub fn segment_path(path: &Path, last_seq: u64) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{:020}", last_seq));
    path.with_file_name(name)
}

/// Sealed segments of the journal at `path`, oldest first
pub fn sealed_segments(path: &Path) -> StorageResult<Vec<(u64, PathBuf)>> {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return Ok(Vec::new());
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}.", name);
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(last_seq) = file_name
            .to_str()
            .and_then(|n| n.strip_prefix(&prefix))
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        segments.push((last_seq, entry.path()));
    }

    segments.sort();
    Ok(segments)
}

/// Deletes sealed segments whose entries are all at or below `covered_seq`
pub fn prune_segments(path: &Path, covered_seq: u64) -> StorageResult<usize> {
    let mut removed = 0;
    for (last_seq, segment) in sealed_segments(path)? {
        if last_seq > covered_seq {
            break;
        }
        fs::remove_file(&segment)?;
        removed += 1;
    }
    if removed > 0 {
        debug!(
            "Pruned {} journal segments up to seq {}",
            removed, covered_seq
        );
    }
    Ok(removed)
}

/// Reads the entries numbered after `after_seq` across every segment
pub fn read_since(path: &Path, after_seq: u64) -> StorageResult<Vec<JournalEntry>> {
    let mut entries = Vec::new();
    let mut collect = |entry: JournalEntry| {
        if entry.seq > after_seq {
            entries.push(entry);
        }
    };

    for (last_seq, segment) in sealed_segments(path)? {
        if last_seq > after_seq {
            scan(&segment, &mut collect)?;
        }
    }
    if path.exists() {
        scan(path, &mut collect)?;
    }
    Ok(entries)
}

/// Reads every complete entry of one journal file
///
/// Returns the entries and the byte length of the intact prefix. A final
/// line that does not parse is treated as a torn write and dropped; a bad
/// line anywhere else is corruption.
pub fn read_entries(path: &Path) -> StorageResult<(Vec<JournalEntry>, u64)> {
    let mut entries = Vec::new();
    let scanned = scan(path, |entry| entries.push(entry))?;
    Ok((entries, scanned.valid_len))
}

/// What one pass over a journal file found
#[derive(Debug, Default)]
struct Scan {
    valid_len: u64,
    last_seq: Option<u64>,
    count: u64,
}

/// Streams each complete entry of one file to `visit`
fn scan<F>(path: &Path, mut visit: F) -> StorageResult<Scan>
where
    F: FnMut(JournalEntry),
{
    let mut reader = BufReader::new(File::open(path)?);
    let mut scanned = Scan::default();
    let mut line = String::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let result = serde_json::from_str::<JournalEntry>(line.trim_end());
        let at_end = is_eof(&mut reader)?;
        match result {
            Ok(entry) if line.ends_with('\n') => {
                scanned.valid_len += read as u64;
                scanned.last_seq = Some(entry.seq);
                scanned.count += 1;
                visit(entry);
            }
            _ if at_end => {
                warn!(
                    "Ignoring torn journal entry at line {} of {}",
                    line_no,
                    path.display()
                );
                break;
            }
            Ok(_) => {
                return Err(corrupt(path, format!("line {}: unterminated entry", line_no)));
            }
            Err(e) => return Err(corrupt(path, format!("line {}: {}", line_no, e))),
        }
    }

    Ok(scanned)
}

fn is_eof(reader: &mut BufReader<File>) -> StorageResult<bool> {
    Ok(reader.fill_buf()?.is_empty())
}

fn corrupt(path: &Path, reason: String) -> StorageError {
    StorageError::Corrupt {
        path: path.to_path_buf(),
        reason,
    }
}

fn create_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
