use crate::common::{fast_config, fetch, schedule_all, success};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use sumi_frontier::config::{Config, FingerprintBackend, QueueBackend};
use sumi_frontier::output::FrontierStats;
use sumi_frontier::storage::checkpoint::VALID_FILE;
use sumi_frontier::storage::journal::{read_entries, read_since, sealed_segments};
use sumi_frontier::storage::Checkpoint;
use sumi_frontier::{
    Directive, FetchOutcome, Frontier, FrontierError, Next, ScheduleOutcome, UriRecord,
};
use tempfile::TempDir;

/// What a recovered frontier must agree on with the one it replaces
#[derive(Debug, PartialEq)]
struct Observed {
    queued_uris: Vec<String>,
    discovered: u64,
    succeeded: u64,
    failed: u64,
    retried: u64,
}

fn observe(frontier: &Frontier) -> Observed {
    let stats: FrontierStats = frontier.stats();
    Observed {
        queued_uris: frontier.queued_uris().unwrap(),
        discovered: stats.discovered,
        succeeded: stats.succeeded,
        failed: stats.failed,
        retried: stats.retried,
    }
}

/// Runs a small crawl with a checkpoint in the middle
///
/// Returns the checkpoint path and the frontier's state at the moment of
/// the simulated crash, which leaves one record in flight.
fn crawl_and_crash(config: Config) -> (std::path::PathBuf, Observed) {
    let frontier = Frontier::new(config).unwrap();

    schedule_all(
        &frontier,
        &[
            "http://a.com/1",
            "http://a.com/2",
            "http://b.com/1",
            "http://c.com/1",
        ],
    );
    let record = fetch(&frontier);
    frontier.finished(&record, success()).unwrap();

    let checkpoint = frontier.checkpoint_now().unwrap();

    schedule_all(&frontier, &["http://d.com/1"]);
    let record = fetch(&frontier);
    frontier
        .finished(
            &record,
            FetchOutcome::from_status_code(503, Duration::from_millis(5)),
        )
        .unwrap();
    let record = fetch(&frontier);
    frontier.finished(&record, success()).unwrap();

    // Handed out but never finished
    let _in_flight = fetch(&frontier);

    let observed = observe(&frontier);
    (checkpoint, observed)
}

fn catalogue(config: &Config) -> &Path {
    Path::new(&config.checkpoint.dir)
}

#[test]
fn test_checkpoint_round_trip_with_journal_replay() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());

    let (_, before) = crawl_and_crash(config.clone());
    assert_eq!(before.queued_uris.len(), 3);

    let recovered = Frontier::recover(config.clone(), catalogue(&config)).unwrap();
    assert_eq!(observe(&recovered), before);

    for uri in [
        "http://a.com/1",
        "http://a.com/2",
        "http://b.com/1",
        "http://c.com/1",
        "http://d.com/1",
    ] {
        assert!(recovered.has_seen(uri).unwrap(), "{} forgotten", uri);
    }
    assert_eq!(
        recovered.schedule(UriRecord::seed("http://b.com/1")).unwrap(),
        ScheduleOutcome::Duplicate
    );

    // The record in flight at the crash is handed out again
    let stats = recovered.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.queued, 3);
}

#[test]
fn test_replaying_journal_twice_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());

    let (checkpoint, _) = crawl_and_crash(config.clone());
    let recovered = Frontier::recover(config.clone(), &checkpoint).unwrap();
    let once = observe(&recovered);

    let journal_seq = Checkpoint::open(&checkpoint).unwrap().manifest.journal_seq;
    let entries = read_since(Path::new(&config.checkpoint.journal_path), journal_seq).unwrap();
    assert!(!entries.is_empty());
    let report = recovered.replay(&entries, journal_seq).unwrap();

    assert_eq!(report.applied, 0);
    assert_eq!(report.skipped, entries.len() as u64);
    assert_eq!(observe(&recovered), once);
}

#[test]
fn test_force_fetch_after_checkpoint_survives_recovery() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());

    let before = {
        let frontier = Frontier::new(config.clone()).unwrap();
        schedule_all(&frontier, &["http://a.com/"]);
        let record = fetch(&frontier);
        frontier.finished(&record, success()).unwrap();
        frontier.checkpoint_now().unwrap();

        // Already in the checkpoint's fingerprints, queued again on request
        let forced = UriRecord::seed("http://a.com/").with_directive(Directive::ForceFetch);
        assert_eq!(frontier.schedule(forced).unwrap(), ScheduleOutcome::Accepted);
        observe(&frontier)
    };
    assert_eq!(before.queued_uris, vec!["http://a.com/".to_string()]);

    let recovered = Frontier::recover(config.clone(), catalogue(&config)).unwrap();
    assert_eq!(observe(&recovered), before);

    // Replaying the same entries again does not queue it twice
    let entries = read_since(Path::new(&config.checkpoint.journal_path), 0).unwrap();
    let report = recovered.replay(&entries, 0).unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(observe(&recovered), before);

    let record = fetch(&recovered);
    assert_eq!(record.canonical, "http://a.com/");
    recovered.finished(&record, success()).unwrap();
    assert_eq!(recovered.try_next().unwrap(), Some(Next::Ended));
}

#[test]
fn test_checkpoints_keep_the_journal_short() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let journal_path = Path::new(&config.checkpoint.journal_path);

    let frontier = Frontier::new(config.clone()).unwrap();
    let uris: Vec<String> = (0..200).map(|i| format!("http://a.com/{}", i)).collect();
    for uri in &uris {
        assert!(frontier.schedule(UriRecord::seed(uri.clone())).unwrap().is_accepted());
    }
    frontier.checkpoint_now().unwrap();
    frontier.checkpoint_now().unwrap();

    // Everything is covered by the first checkpoint, so nothing is left to read
    assert_eq!(fs::metadata(journal_path).unwrap().len(), 0);
    assert!(sealed_segments(journal_path).unwrap().is_empty());
    assert!(read_since(journal_path, 0).unwrap().is_empty());

    schedule_all(&frontier, &["http://b.com/"]);
    let before = observe(&frontier);
    drop(frontier);

    let (live, _) = read_entries(journal_path).unwrap();
    assert_eq!(live.len(), 1);

    let recovered = Frontier::recover(config.clone(), catalogue(&config)).unwrap();
    assert_eq!(observe(&recovered), before);
    assert!(recovered.has_seen("http://a.com/199").unwrap());
}

#[test]
fn test_recovered_frontier_keeps_working() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());

    crawl_and_crash(config.clone());
    let recovered = Frontier::recover(config.clone(), catalogue(&config)).unwrap();

    let mut finished = 0;
    loop {
        match recovered.try_next().unwrap() {
            Some(Next::Fetch(record)) => {
                recovered.finished(&record, success()).unwrap();
                finished += 1;
            }
            Some(Next::Ended) => break,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(finished, 3);

    // A second crash after more work recovers the combined state
    let path = recovered.checkpoint_now().unwrap();
    let after = observe(&recovered);
    drop(recovered);

    let again = Frontier::recover(config, &path).unwrap();
    assert_eq!(observe(&again), after);
    assert!(again.is_exhausted());
}

#[test]
fn test_torn_checkpoint_falls_back_to_older_one() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let frontier = Frontier::new(config.clone()).unwrap();

    schedule_all(&frontier, &["http://a.com/1", "http://b.com/1"]);
    let older = frontier.checkpoint_now().unwrap();

    schedule_all(&frontier, &["http://c.com/1"]);
    let newer = frontier.checkpoint_now().unwrap();
    let before = observe(&frontier);
    drop(frontier);

    fs::remove_file(newer.join(VALID_FILE)).unwrap();

    // The older checkpoint plus the journal reach the same state
    let recovered = Frontier::recover(config.clone(), catalogue(&config)).unwrap();
    assert_eq!(observe(&recovered), before);
    assert!(older.join(VALID_FILE).exists());

    // Asking for the torn checkpoint directly fails loudly
    match Frontier::recover(config, &newer) {
        Err(FrontierError::CorruptCheckpoint { .. }) => {}
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("recovered from a torn checkpoint"),
    }
}

#[test]
fn test_recover_without_checkpoint_fails() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    fs::create_dir_all(catalogue(&config)).unwrap();

    match Frontier::recover(config.clone(), catalogue(&config)) {
        Err(FrontierError::CorruptCheckpoint { .. }) => {}
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("started from nothing"),
    }
}

#[test]
fn test_recover_from_journal_alone() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());

    let before = {
        let frontier = Frontier::new(config.clone()).unwrap();
        schedule_all(&frontier, &["http://a.com/1", "http://a.com/2", "http://b.com/1"]);
        let record = fetch(&frontier);
        frontier.finished(&record, success()).unwrap();
        observe(&frontier)
    };

    // A crash mid-append leaves a torn final line
    let mut journal = OpenOptions::new()
        .append(true)
        .open(&config.checkpoint.journal_path)
        .unwrap();
    journal.write_all(b"{\"seq\":99,\"at\":\"20").unwrap();
    drop(journal);

    let recovered = Frontier::recover_from_journal(config.clone()).unwrap();
    assert_eq!(observe(&recovered), before);
    assert!(recovered.has_seen("http://a.com/1").unwrap());

    // New entries continue after the last intact one
    schedule_all(&recovered, &["http://c.com/1"]);
    drop(recovered);
    let (entries, _) = read_entries(Path::new(&config.checkpoint.journal_path)).unwrap();
    let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=seqs.len() as u64).collect::<Vec<_>>());
}

#[test]
fn test_disk_backends_round_trip() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config(temp.path());
    config.storage.fingerprints = FingerprintBackend::Disk;
    config.storage.fingerprint_cache_size = 4;
    config.storage.queues = QueueBackend::Spill;
    config.storage.queue_memory_threshold = 2;

    let frontier = Frontier::new(config.clone()).unwrap();
    let uris: Vec<String> = (0..10).map(|i| format!("http://a.com/{}", i)).collect();
    for uri in &uris {
        assert!(frontier.schedule(UriRecord::seed(uri.clone())).unwrap().is_accepted());
    }
    for uri in &uris {
        assert_eq!(
            frontier.schedule(UriRecord::seed(uri.clone())).unwrap(),
            ScheduleOutcome::Duplicate
        );
    }

    // Spilled records come back in order
    for expected in uris.iter().take(4) {
        let record = fetch(&frontier);
        assert_eq!(&record.canonical, expected);
        frontier.finished(&record, success()).unwrap();
    }

    let path = frontier.checkpoint_now().unwrap();
    let before = observe(&frontier);
    drop(frontier);

    let recovered = Frontier::recover(config, &path).unwrap();
    assert_eq!(observe(&recovered), before);
    for uri in &uris {
        assert!(recovered.has_seen(uri).unwrap());
    }
    assert_eq!(fetch(&recovered).canonical, "http://a.com/4");
}
