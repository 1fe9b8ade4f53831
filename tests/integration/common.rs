use std::path::Path;
use std::time::Duration;
use sumi_frontier::{Config, FetchOutcome, Frontier, Next, UriRecord};

/// A configuration rooted in `dir` with no politeness delay
pub fn fast_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.politeness.min_delay_ms = 0;
    config.politeness.max_delay_ms = 0;
    config.politeness.delay_factor = 0.0;
    config.politeness.max_retries = 2;
    config.scheduler.poll_interval_ms = 20;
    config.checkpoint.journal_path = dir.join("frontier.journal").display().to_string();
    config.checkpoint.dir = dir.join("checkpoints").display().to_string();
    config.storage.work_dir = dir.join("work").display().to_string();
    config
}

/// Takes the next record without waiting, panicking if none is ready
pub fn fetch(frontier: &Frontier) -> UriRecord {
    match frontier.try_next().unwrap() {
        Some(Next::Fetch(record)) => record,
        other => panic!("expected a record, got {:?}", other),
    }
}

pub fn success() -> FetchOutcome {
    FetchOutcome::success(Duration::from_millis(5))
}

pub fn schedule_all(frontier: &Frontier, uris: &[&str]) {
    for uri in uris {
        assert!(
            frontier.schedule(UriRecord::seed(*uri)).unwrap().is_accepted(),
            "{} was not accepted",
            uri
        );
    }
}
