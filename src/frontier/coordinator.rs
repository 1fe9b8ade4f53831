//! Frontier facade - the API workers and link extractors call
//!
//! This module ties the frontier together:
//! - Canonicalization, scope checks and duplicate detection in `schedule()`
//! - Handing out one record per ready key in `next()`
//! - Retry and politeness bookkeeping in `finished()`
//! - Write-ahead journaling, checkpoints and recovery
//! - Pause, unpause and terminate

use crate::config::{Config, FingerprintBackend};
use crate::fingerprint::{fingerprint, DiskFingerprintSet, FingerprintSet, MemoryFingerprintSet};
use crate::frontier::counters::Counters;
use crate::frontier::directory::QueueDirectory;
use crate::frontier::scheduler::ReadySet;
use crate::frontier::{CapacityLimit, Next, ScheduleOutcome};
use crate::output::FrontierStats;
use crate::queue::{HostQueue, QueueFactory};
use crate::state::{Directive, Disposition, FetchOutcome, QueueState, UriRecord};
use crate::storage::checkpoint::{find_latest, find_oldest, next_catalogue_dir};
use crate::storage::journal::prune_segments;
use crate::storage::{
    open_work_database, Checkpoint, CheckpointManifest, CheckpointWriter, Journal, JournalEntry,
    JournalOp, StorageError,
};
use crate::url::{canonicalize, CanonRule, HopLimits};
use crate::{lock, FrontierError, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// How many journal entries a replay applied and skipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: u64,
    /// Entries already covered, or whose effect was already present
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Live,
    Replay,
}

/// The crawl frontier
///
/// All methods take `&self`; share a frontier between workers with an
/// `Arc`. `schedule()`, `finished()` and `checkpoint()` are synchronous and
/// only block on the journal write and the work database. `next()` is
/// async and waits cooperatively when nothing is ready.
pub struct Frontier {
    config: Config,
    rules: Vec<CanonRule>,
    limits: HopLimits,
    fingerprints: Box<dyn FingerprintSet>,
    factory: QueueFactory,
    directory: QueueDirectory,
    ready: Mutex<ReadySet>,
    journal: Mutex<Journal>,
    /// Highest journal sequence number whose effect is in memory
    applied_seq: AtomicU64,
    counters: Counters,
    /// Shared by every transition, exclusive while a checkpoint copies state
    gate: RwLock<()>,
    wakeup: Notify,
    paused: AtomicBool,
    terminated: AtomicBool,
    failed: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// Any journal at the configured path is truncated and the work
    /// database is emptied.
    pub fn new(config: Config) -> Result<Self> {
        let journal = Journal::create(
            Path::new(&config.checkpoint.journal_path),
            config.checkpoint.journal_sync,
            config.checkpoint.journal_sync_every,
        )?;

        let frontier = Self::build(config, journal)?;
        info!(
            "Started empty frontier (journal at {})",
            frontier.config.checkpoint.journal_path
        );
        Ok(frontier)
    }

    /// Rebuilds a frontier from a checkpoint plus the journal written after it
    ///
    /// `checkpoint_dir` may be a single checkpoint or a catalogue of them, in
    /// which case the newest valid one is used. Fails with
    /// `CorruptCheckpoint` if no valid checkpoint can be found.
    pub fn recover(config: Config, checkpoint_dir: &Path) -> Result<Self> {
        let checkpoint = match find_latest(checkpoint_dir) {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => {
                return Err(FrontierError::CorruptCheckpoint {
                    path: checkpoint_dir.to_path_buf(),
                    reason: "no valid checkpoint found".to_string(),
                })
            }
            Err(e) => {
                return Err(FrontierError::CorruptCheckpoint {
                    path: checkpoint_dir.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        info!(
            "Recovering from checkpoint {} (stamped {})",
            checkpoint.path.display(),
            checkpoint.stamped_at
        );

        let journal_seq = checkpoint.manifest.journal_seq;
        let (journal, entries) = Journal::open_append(
            Path::new(&config.checkpoint.journal_path),
            config.checkpoint.journal_sync,
            config.checkpoint.journal_sync_every,
            journal_seq,
        )?;

        let frontier = Self::build(config, journal)?;
        frontier
            .load_checkpoint(&checkpoint)
            .map_err(|e| match e {
                FrontierError::Storage(StorageError::Corrupt { path, reason }) => {
                    FrontierError::CorruptCheckpoint { path, reason }
                }
                other => other,
            })?;

        let report = frontier.replay(&entries, journal_seq)?;
        info!(
            "Recovery complete: {} journal entries replayed, {} already reflected",
            report.applied, report.skipped
        );
        Ok(frontier)
    }

    /// Rebuilds a frontier from the journal alone
    ///
    /// Used after a crash that happened before the first checkpoint.
    pub fn recover_from_journal(config: Config) -> Result<Self> {
        let (journal, entries) = Journal::open_append(
            Path::new(&config.checkpoint.journal_path),
            config.checkpoint.journal_sync,
            config.checkpoint.journal_sync_every,
            0,
        )?;

        let frontier = Self::build(config, journal)?;
        let report = frontier.replay(&entries, 0)?;
        info!(
            "Rebuilt frontier from {} journal entries ({} skipped)",
            report.applied, report.skipped
        );
        Ok(frontier)
    }

    fn build(config: Config, journal: Journal) -> Result<Self> {
        let storage = if config.storage.needs_database() {
            let db = open_work_database(&config.storage.database_path())?;
            Some(Arc::new(Mutex::new(db)))
        } else {
            None
        };

        let fingerprints: Box<dyn FingerprintSet> = match (config.storage.fingerprints, &storage) {
            (FingerprintBackend::Disk, Some(storage)) => Box::new(DiskFingerprintSet::new(
                Arc::clone(storage),
                config.storage.fingerprint_cache_size,
            )?),
            _ => Box::new(MemoryFingerprintSet::new()),
        };

        let factory = QueueFactory::from_config(&config.storage, storage);
        let limits = HopLimits {
            max_link_hops: config.scope.max_link_hops,
            max_trans_hops: config.scope.max_trans_hops,
            policy: config.scope.hop_policy,
        };
        let ready = ReadySet::new(
            config.scheduler.selection,
            config.scheduler.max_busy_queues,
        );

        Ok(Self {
            rules: config.canonicalization.active_rules(),
            limits,
            fingerprints,
            factory,
            directory: QueueDirectory::new(),
            ready: Mutex::new(ready),
            journal: Mutex::new(journal),
            applied_seq: AtomicU64::new(0),
            counters: Counters::default(),
            gate: RwLock::new(()),
            wakeup: Notify::new(),
            paused: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Offers a discovered record to the frontier
    ///
    /// Rejections (duplicate, out of scope, over capacity) are outcomes,
    /// not errors. Errors are a malformed URI, a storage failure, a
    /// terminated frontier, or a fatal journal failure.
    pub fn schedule(&self, record: UriRecord) -> Result<ScheduleOutcome> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(FrontierError::Terminated);
        }
        self.check_failed()?;

        let _gate = self.shared();
        self.admit(record, Mode::Live)
    }

    fn admit(&self, mut record: UriRecord, mode: Mode) -> Result<ScheduleOutcome> {
        let live = mode == Mode::Live;

        let url = canonicalize(&record.uri, &self.rules)?;
        record.key = self.config.scheduler.queue_key.key_for(&url)?;
        record.canonical = url.to_string();

        if live {
            Counters::bump(&self.counters.discovered);
        }

        if let Err(reason) = self.limits.check(&record.hops) {
            if live {
                Counters::bump(&self.counters.out_of_scope);
            }
            debug!("Out of scope: {} ({})", record.canonical, reason);
            return Ok(ScheduleOutcome::OutOfScope(reason));
        }

        let fp = fingerprint(&record.canonical);

        if record.directive == Directive::MarkSeen {
            let novel = self.fingerprints.add_if_absent(fp)?;
            if !novel && !live {
                return Ok(ScheduleOutcome::Duplicate);
            }
            if novel {
                self.log_schedule(&record, mode)?;
                Counters::bump(&self.counters.marked_seen);
            }
            trace!("Marked seen: {}", record.canonical);
            return Ok(ScheduleOutcome::MarkedSeen);
        }

        if live {
            if let Some(limit) = self.capacity_exceeded(&record.key) {
                Counters::bump(&self.counters.capacity_rejected);
                debug!("Rejected {}: {} reached", record.canonical, limit);
                return Ok(ScheduleOutcome::CapacityExceeded(limit));
            }
        }

        let novel = self.fingerprints.add_if_absent(fp)?;
        let forced = record.directive == Directive::ForceFetch;
        if !novel && !forced {
            if live {
                Counters::bump(&self.counters.duplicates);
            }
            trace!("Duplicate: {}", record.canonical);
            return Ok(ScheduleOutcome::Duplicate);
        }

        let key = record.key.clone();
        let canonical = record.canonical.clone();
        let changed = self.directory.with_queue(
            &key,
            || self.new_queue(&key),
            |queue, created| -> Result<bool> {
                let now = Instant::now();
                if created {
                    lock(&self.ready).register(&key, now);
                }

                let mut queue = lock(queue);
                self.log_schedule(&record, mode)?;
                if let Err(e) = queue.enqueue(record) {
                    return Err(self.fail(format!(
                        "queue {} diverged from the journal on schedule: {}",
                        key, e
                    )));
                }
                Ok(lock(&self.ready).enqueued(&key, now))
            },
        )?;

        if !live {
            Counters::bump(&self.counters.discovered);
        }
        if changed {
            self.wakeup.notify_waiters();
        }

        debug!("Scheduled {} under {}", canonical, key);
        Ok(ScheduleOutcome::Accepted)
    }

    fn capacity_exceeded(&self, key: &str) -> Option<CapacityLimit> {
        let max_queued = self.config.scheduler.max_queued_uris;
        if max_queued > 0 && lock(&self.ready).pending_total() >= max_queued {
            return Some(CapacityLimit::QueuedUris);
        }

        let max_open = self.config.scheduler.max_open_queues;
        if max_open > 0 && !self.directory.contains(key) && self.directory.len() >= max_open {
            self.retire_idle(Instant::now());
            if self.directory.len() >= max_open {
                return Some(CapacityLimit::OpenQueues);
            }
        }

        None
    }

    fn new_queue(&self, key: &str) -> HostQueue {
        HostQueue::new(
            key,
            self.factory.create(key),
            self.config.politeness_for(key),
        )
    }

    /// Waits for the next record to fetch
    ///
    /// Returns `Next::Ended` once nothing is queued or in flight, and
    /// `Next::ShuttingDown` after `terminate()`. While paused, or while
    /// every key is busy or snoozed, the caller waits until a key wakes, a
    /// record arrives, or the poll interval passes.
    pub async fn next(&self) -> Result<Next> {
        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(next) = self.try_next()? {
                return Ok(next);
            }

            let now = Instant::now();
            let poll = now + self.config.scheduler.poll_interval();
            let deadline = match lock(&self.ready).next_wake() {
                Some(wake) if wake > now => wake.min(poll),
                _ => poll,
            };

            trace!("Waiting {:?} for a ready queue", deadline - now);
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }

    /// Non-blocking `next()`: `Ok(None)` means the caller would have waited
    pub fn try_next(&self) -> Result<Option<Next>> {
        if self.terminated.load(Ordering::SeqCst) {
            return Ok(Some(Next::ShuttingDown));
        }
        self.check_failed()?;
        if self.paused.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let _gate = self.shared();
        let now = Instant::now();
        self.retire_idle(now);

        let (selected, exhausted) = {
            let mut ready = lock(&self.ready);
            let selected = ready.select(now);
            (selected, ready.is_exhausted())
        };
        let Some(key) = selected else {
            return Ok(exhausted.then_some(Next::Ended));
        };

        let Some(queue) = self.directory.get(&key) else {
            return Err(self.fail(format!("selected key {} has no queue", key)));
        };

        let taken = lock(&queue).take_head();
        match taken {
            Ok(Some(record)) => {
                debug!("Handing out {}", record.canonical);
                Ok(Some(Next::Fetch(record)))
            }
            Ok(None) => Err(self.fail(format!("selected queue {} was empty", key))),
            Err(e) => {
                lock(&self.ready).unselect(&key);
                Err(e.into())
            }
        }
    }

    /// Reports the outcome of fetching a record handed out by `next()`
    ///
    /// Fails with `NotBusy` unless `record` is the record its queue is
    /// currently waiting on.
    pub fn finished(&self, record: &UriRecord, outcome: FetchOutcome) -> Result<Disposition> {
        self.check_failed()?;

        let _gate = self.shared();
        let not_busy = || FrontierError::NotBusy {
            key: record.key.clone(),
        };
        let queue = self.directory.get(&record.key).ok_or_else(not_busy)?;

        let disposition = {
            let mut queue = lock(&queue);
            if !queue.holds(record) {
                return Err(not_busy());
            }

            self.log_finish(record, &outcome)?;

            let delay = queue.politeness().delay_after(outcome.duration);
            let settled = queue.complete(&outcome, self.config.politeness.max_retries);
            let disposition = match settled {
                Ok(Some(disposition)) => disposition,
                Ok(None) => return Err(not_busy()),
                Err(e) => {
                    lock(&self.ready).release(
                        &record.key,
                        Instant::now(),
                        delay,
                        false,
                        queue.fetched(),
                    );
                    return Err(self.fail(format!(
                        "queue {} diverged from the journal on finish: {}",
                        record.key, e
                    )));
                }
            };

            let requeued = matches!(disposition, Disposition::Retrying { .. });
            lock(&self.ready).release(
                &record.key,
                Instant::now(),
                delay,
                requeued,
                queue.fetched(),
            );
            trace!("Released {} for {:?}", record.key, delay);
            disposition
        };

        self.count_disposition(disposition);
        self.wakeup.notify_waiters();

        debug!(
            "Finished {} ({}): {:?}",
            record.canonical, outcome.status, disposition
        );
        Ok(disposition)
    }

    fn count_disposition(&self, disposition: Disposition) {
        let counter = match disposition {
            Disposition::Succeeded => &self.counters.succeeded,
            Disposition::Retrying { .. } => &self.counters.retried,
            Disposition::Failed => &self.counters.failed,
        };
        Counters::bump(counter);
    }

    /// Stops handing out records; queued work and in-flight fetches are kept
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("Frontier paused");
        }
    }

    pub fn unpause(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Frontier unpaused");
            self.wakeup.notify_waiters();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Shuts the frontier down
    ///
    /// Every waiting and future `next()` returns `Next::ShuttingDown` and
    /// `schedule()` is refused. Fetches already handed out may still be
    /// reported through `finished()`.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        let in_flight = lock(&self.ready).busy();
        info!("Frontier terminating ({} fetches in flight)", in_flight);

        if let Err(e) = lock(&self.journal).sync() {
            warn!("Failed to sync journal on terminate: {}", e);
        }
        self.wakeup.notify_waiters();
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Returns true if nothing is queued and nothing is in flight
    pub fn is_exhausted(&self) -> bool {
        lock(&self.ready).is_exhausted()
    }

    /// Writes a checkpoint of the whole frontier into `dir`
    ///
    /// Every transition is held off while the state is copied, so the
    /// checkpoint is consistent with the journal sequence it records. Once
    /// the checkpoint is stamped the journal moves on to a new segment.
    pub fn checkpoint(&self, dir: &Path) -> Result<PathBuf> {
        self.check_failed()?;

        let _freeze = self.exclusive();

        let journal_seq = {
            let mut journal = lock(&self.journal);
            if let Err(e) = journal.sync() {
                return Err(self.fail(format!("journal sync failed: {}", e)));
            }
            journal.last_seq()
        };

        let mut writer = CheckpointWriter::begin(dir)?;
        let entries = self.directory.entries();
        for (_, queue) in &entries {
            let snapshot = lock(queue).snapshot()?;
            writer.write_queue(&snapshot)?;
        }
        let fingerprint_count = writer.write_fingerprints(self.fingerprints.as_ref())?;

        let manifest = CheckpointManifest {
            counters: self.counters.snapshot(),
            journal_seq,
            created_at: Utc::now(),
            queue_count: entries.len(),
            fingerprint_count,
        };
        let path = writer.finish(&manifest)?;

        let rotated = lock(&self.journal).rotate();
        if let Err(e) = rotated {
            return Err(self.fail(format!("journal rotation failed: {}", e)));
        }

        info!(
            "Checkpoint written to {} ({} queues, {} fingerprints, journal seq {})",
            path.display(),
            entries.len(),
            fingerprint_count,
            journal_seq
        );
        Ok(path)
    }

    /// Writes a checkpoint into the next slot of the configured catalogue
    ///
    /// Journal segments covered by the oldest valid checkpoint left in the
    /// catalogue are deleted afterwards. Checkpoints written elsewhere with
    /// `checkpoint()` do not hold segments back.
    pub fn checkpoint_now(&self) -> Result<PathBuf> {
        let root = Path::new(&self.config.checkpoint.dir);
        let path = self.checkpoint(&next_catalogue_dir(root)?)?;

        if let Some(oldest) = find_oldest(root)? {
            let journal_path = Path::new(&self.config.checkpoint.journal_path);
            if let Err(e) = prune_segments(journal_path, oldest.manifest.journal_seq) {
                warn!("Failed to prune journal segments: {}", e);
            }
        }
        Ok(path)
    }

    fn load_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let fingerprint_count =
            checkpoint.read_fingerprints(|batch| self.fingerprints.import(batch))?;

        let now = Instant::now();
        let mut records = 0usize;
        for snapshot in checkpoint.queues()? {
            records += snapshot.pending.len() + usize::from(snapshot.in_flight.is_some());
            let key = snapshot.key.clone();

            self.directory.with_queue(
                &key,
                || self.new_queue(&key),
                |queue, created| -> Result<()> {
                    if created {
                        lock(&self.ready).register(&key, now);
                    }
                    let mut queue = lock(queue);
                    queue.restore_totals(snapshot.fetched, snapshot.errors);
                    lock(&self.ready).restore_fetched(&key, snapshot.fetched);

                    // The record in flight at checkpoint time goes back to the head
                    for record in snapshot.in_flight.into_iter().chain(snapshot.pending) {
                        queue.enqueue(record)?;
                        lock(&self.ready).enqueued(&key, now);
                    }
                    Ok(())
                },
            )?;
        }

        self.counters.restore(&checkpoint.manifest.counters);
        self.applied_seq
            .store(checkpoint.manifest.journal_seq, Ordering::SeqCst);

        info!(
            "Loaded checkpoint: {} queues, {} records, {} fingerprints",
            self.directory.len(),
            records,
            fingerprint_count
        );
        Ok(())
    }

    /// Applies journal entries numbered after `after_seq`
    ///
    /// Entries at or below the highest sequence number already applied are
    /// skipped, so replaying the same entries again leaves the state
    /// unchanged. Entries must be in journal order. Must not run while
    /// workers are active.
    pub fn replay(&self, entries: &[JournalEntry], after_seq: u64) -> Result<ReplayReport> {
        let _freeze = self.exclusive();
        let mut report = ReplayReport::default();

        for entry in entries.iter().filter(|entry| entry.seq > after_seq) {
            if entry.seq <= self.applied_seq.load(Ordering::SeqCst) {
                trace!("Journal entry {} already applied", entry.seq);
                report.skipped += 1;
                continue;
            }
            self.applied_seq.store(entry.seq, Ordering::SeqCst);

            let applied = match &entry.op {
                JournalOp::Schedule { record } => matches!(
                    self.admit(record.clone(), Mode::Replay)?,
                    ScheduleOutcome::Accepted | ScheduleOutcome::MarkedSeen
                ),
                JournalOp::Finish { record, outcome } => self.replay_finish(record, outcome)?,
            };

            if applied {
                report.applied += 1;
            } else {
                trace!("Journal entry {} already reflected", entry.seq);
                report.skipped += 1;
            }
        }

        if report.applied > 0 {
            self.wakeup.notify_waiters();
        }
        Ok(report)
    }

    fn replay_finish(&self, record: &UriRecord, outcome: &FetchOutcome) -> Result<bool> {
        let Some(queue) = self.directory.get(&record.key) else {
            return Ok(false);
        };

        let disposition = {
            let mut queue = lock(&queue);
            let replayed =
                queue.replay_finish(record, outcome, self.config.politeness.max_retries)?;
            let Some(disposition) = replayed else {
                return Ok(false);
            };

            let requeued = matches!(disposition, Disposition::Retrying { .. });
            lock(&self.ready).replay_finished(
                &record.key,
                Instant::now(),
                requeued,
                queue.fetched(),
            );
            disposition
        };

        self.count_disposition(disposition);
        Ok(true)
    }

    /// Returns true if `uri` canonicalizes to a fingerprint already seen
    pub fn has_seen(&self, uri: &str) -> Result<bool> {
        let url = canonicalize(uri, &self.rules)?;
        Ok(self.fingerprints.contains_uri(url.as_str())?)
    }

    /// Canonical URIs of every queued and in-flight record, sorted
    pub fn queued_uris(&self) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        for (_, queue) in self.directory.entries() {
            let snapshot = lock(&queue).snapshot()?;
            uris.extend(snapshot.in_flight.into_iter().map(|r| r.canonical));
            uris.extend(snapshot.pending.into_iter().map(|r| r.canonical));
        }
        uris.sort();
        Ok(uris)
    }

    pub fn queue_state(&self, key: &str) -> Option<QueueState> {
        lock(&self.ready).state_of(key)
    }

    /// A consistent-enough view of the frontier's counters
    ///
    /// Each counter is exact; counters read at slightly different moments
    /// may not add up while workers are active.
    pub fn stats(&self) -> FrontierStats {
        let counters = self.counters.snapshot();
        let (counts, queued, busy) = {
            let ready = lock(&self.ready);
            (ready.counts(), ready.pending_total(), ready.busy())
        };

        FrontierStats {
            discovered: counters.discovered,
            queued,
            in_flight: busy as u64,
            duplicates: counters.duplicates,
            out_of_scope: counters.out_of_scope,
            capacity_rejected: counters.capacity_rejected,
            marked_seen: counters.marked_seen,
            succeeded: counters.succeeded,
            failed: counters.failed,
            retried: counters.retried,
            busy_hosts: counts.busy,
            open_queues: self.directory.len(),
            ready_queues: counts.ready,
            snoozed_queues: counts.snoozed,
            empty_queues: counts.empty,
            fingerprints: self.fingerprints.len(),
            paused: self.is_paused(),
            terminated: self.is_terminated(),
        }
    }

    /// Drops queues that are empty and whose politeness delay has passed
    fn retire_idle(&self, now: Instant) {
        if !lock(&self.ready).has_due_retirements(now) {
            return;
        }
        self.directory
            .retire(|| lock(&self.ready).take_retirements(now));
    }

    fn log_schedule(&self, record: &UriRecord, mode: Mode) -> Result<()> {
        if mode == Mode::Replay {
            return Ok(());
        }
        let result = lock(&self.journal).log_schedule(record);
        match result {
            Ok(seq) => {
                self.applied_seq.fetch_max(seq, Ordering::SeqCst);
                trace!("Journaled schedule #{} for {}", seq, record.canonical);
                Ok(())
            }
            Err(e) => Err(self.fail(format!("journal write failed: {}", e))),
        }
    }

    fn log_finish(&self, record: &UriRecord, outcome: &FetchOutcome) -> Result<()> {
        let result = lock(&self.journal).log_finish(record, outcome);
        match result {
            Ok(seq) => {
                self.applied_seq.fetch_max(seq, Ordering::SeqCst);
                trace!("Journaled finish #{} for {}", seq, record.canonical);
                Ok(())
            }
            Err(e) => Err(self.fail(format!("journal write failed: {}", e))),
        }
    }

    /// Halts the frontier; every later mutating call fails with `Fatal`
    fn fail(&self, reason: String) -> FrontierError {
        error!("Frontier halted: {}", reason);
        *lock(&self.failure) = Some(reason.clone());
        self.failed.store(true, Ordering::SeqCst);
        self.wakeup.notify_waiters();
        FrontierError::Fatal(reason)
    }

    fn check_failed(&self) -> Result<()> {
        if !self.failed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let reason = lock(&self.failure)
            .clone()
            .unwrap_or_else(|| "unknown failure".to_string());
        Err(FrontierError::Fatal(reason))
    }

    fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }
}
