use crate::common::{fast_config, fetch, schedule_all, success};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_frontier::frontier::{run_workers, CapacityLimit, FetchReport, Fetcher};
use sumi_frontier::{
    Disposition, FetchOutcome, Frontier, Hop, Next, QueueState, ScheduleOutcome, UriRecord,
};
use tempfile::TempDir;
use tokio::time::Instant;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_hold_one_record_per_key() {
    let temp = TempDir::new().unwrap();
    let frontier = Arc::new(Frontier::new(fast_config(temp.path())).unwrap());

    for host in ["a.com", "b.com", "c.com", "d.com", "e.com"] {
        for page in 0..10 {
            let uri = format!("http://{}/page{}", host, page);
            frontier.schedule(UriRecord::seed(uri)).unwrap();
        }
    }

    let active = Arc::new(Mutex::new(HashSet::new()));
    let fetched = Arc::new(Mutex::new(Vec::new()));
    let overlaps = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let frontier = Arc::clone(&frontier);
        let active = Arc::clone(&active);
        let fetched = Arc::clone(&fetched);
        let overlaps = Arc::clone(&overlaps);

        handles.push(tokio::spawn(async move {
            while let Next::Fetch(record) = frontier.next().await.unwrap() {
                if !active.lock().unwrap().insert(record.key.clone()) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(1)).await;

                // Re-offering a URI in flight must not queue it again
                let again = frontier.schedule(UriRecord::seed(record.uri.clone())).unwrap();
                assert_eq!(again, ScheduleOutcome::Duplicate);

                active.lock().unwrap().remove(&record.key);
                fetched.lock().unwrap().push(record.canonical.clone());
                frontier.finished(&record, success()).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);

    let fetched = fetched.lock().unwrap().clone();
    let unique: HashSet<_> = fetched.iter().collect();
    assert_eq!(fetched.len(), 50);
    assert_eq!(unique.len(), 50);

    let stats = frontier.stats();
    assert_eq!(stats.succeeded, 50);
    assert_eq!(stats.duplicates, 50);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn test_second_record_for_key_waits_for_finish_and_delay() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config(temp.path());
    config.politeness.min_delay_ms = 1_000;
    config.politeness.max_delay_ms = 10_000;
    config.politeness.delay_factor = 2.0;
    let frontier = Frontier::new(config).unwrap();

    schedule_all(&frontier, &["http://a.com/", "http://a.com/x", "http://b.com/"]);

    let (first, second) = tokio::join!(frontier.next(), frontier.next());
    let mut granted = Vec::new();
    for next in [first.unwrap(), second.unwrap()] {
        match next {
            Next::Fetch(record) => granted.push(record),
            other => panic!("expected a record, got {:?}", other),
        }
    }

    let keys: HashSet<&str> = granted.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, HashSet::from(["a.com", "b.com"]));
    assert_eq!(frontier.try_next().unwrap(), None);

    let a = granted.iter().find(|r| r.key == "a.com").unwrap();
    assert_eq!(a.canonical, "http://a.com/");
    frontier
        .finished(a, FetchOutcome::success(Duration::from_millis(10)))
        .unwrap();
    assert_eq!(frontier.queue_state("a.com"), Some(QueueState::Snoozed));
    assert_eq!(frontier.try_next().unwrap(), None);

    tokio::time::advance(Duration::from_millis(999)).await;
    assert_eq!(frontier.try_next().unwrap(), None);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(fetch(&frontier).canonical, "http://a.com/x");
}

#[tokio::test(start_paused = true)]
async fn test_grants_to_one_key_respect_min_delay() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config(temp.path());
    config.politeness.min_delay_ms = 1_000;
    config.politeness.max_delay_ms = 10_000;
    config.politeness.delay_factor = 2.0;
    let frontier = Arc::new(Frontier::new(config).unwrap());

    schedule_all(
        &frontier,
        &[
            "http://a.com/1",
            "http://a.com/2",
            "http://a.com/3",
            "http://a.com/4",
        ],
    );

    let grants = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let frontier = Arc::clone(&frontier);
        let grants = Arc::clone(&grants);
        handles.push(tokio::spawn(async move {
            while let Next::Fetch(record) = frontier.next().await.unwrap() {
                grants.lock().unwrap().push(Instant::now());
                frontier
                    .finished(&record, FetchOutcome::success(Duration::from_millis(10)))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut grants = grants.lock().unwrap().clone();
    grants.sort();
    assert_eq!(grants.len(), 4);
    for pair in grants.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1_000));
    }
}

#[test]
fn test_drain_to_empty_accounts_for_every_record() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config(temp.path());
    config.scope.max_trans_hops = 2;
    let frontier = Frontier::new(config).unwrap();

    schedule_all(
        &frontier,
        &["http://a.com/1", "http://a.com/2", "http://b.com/1"],
    );
    assert_eq!(
        frontier.schedule(UriRecord::seed("http://a.com/1#again")).unwrap(),
        ScheduleOutcome::Duplicate
    );
    let deep = UriRecord::discovered(
        "http://c.com/widget.js",
        "LEXX",
        Some("http://b.com/1".to_string()),
        false,
    );
    assert!(matches!(
        frontier.schedule(deep).unwrap(),
        ScheduleOutcome::OutOfScope(_)
    ));

    let mut ended = false;
    for _ in 0..20 {
        match frontier.try_next().unwrap() {
            Some(Next::Fetch(record)) => {
                let outcome = if record.canonical == "http://b.com/1" && record.attempts == 0 {
                    FetchOutcome::from_status_code(503, Duration::from_millis(5))
                } else {
                    success()
                };
                frontier.finished(&record, outcome).unwrap();
            }
            Some(Next::Ended) => {
                ended = true;
                break;
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert!(ended);

    let stats = frontier.stats();
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.retried, 1);
    assert_eq!(
        stats.finished(),
        stats.discovered - stats.duplicates - stats.out_of_scope
    );
    assert_eq!(stats.finished(), 3);
    assert!(frontier.is_exhausted());
}

#[test]
fn test_permanent_failure_is_not_retried() {
    let temp = TempDir::new().unwrap();
    let frontier = Frontier::new(fast_config(temp.path())).unwrap();
    schedule_all(&frontier, &["http://a.com/missing"]);

    let record = fetch(&frontier);
    let disposition = frontier
        .finished(
            &record,
            FetchOutcome::from_status_code(404, Duration::from_millis(5)),
        )
        .unwrap();
    assert_eq!(disposition, Disposition::Failed);
    assert_eq!(frontier.try_next().unwrap(), Some(Next::Ended));
}

#[test]
fn test_capacity_rejection_can_be_offered_again() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config(temp.path());
    config.scheduler.max_queued_uris = 1;
    let frontier = Frontier::new(config).unwrap();

    schedule_all(&frontier, &["http://a.com/1"]);
    assert_eq!(
        frontier.schedule(UriRecord::seed("http://a.com/2")).unwrap(),
        ScheduleOutcome::CapacityExceeded(CapacityLimit::QueuedUris)
    );
    assert!(!frontier.has_seen("http://a.com/2").unwrap());

    let record = fetch(&frontier);
    frontier.finished(&record, success()).unwrap();

    assert!(frontier
        .schedule(UriRecord::seed("http://a.com/2"))
        .unwrap()
        .is_accepted());
    assert_eq!(frontier.stats().capacity_rejected, 1);
}

#[tokio::test]
async fn test_unpause_wakes_waiting_worker() {
    let temp = TempDir::new().unwrap();
    let frontier = Arc::new(Frontier::new(fast_config(temp.path())).unwrap());
    schedule_all(&frontier, &["http://a.com/"]);
    frontier.pause();

    let waiter = {
        let frontier = Arc::clone(&frontier);
        tokio::spawn(async move { frontier.next().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    frontier.unpause();
    let next = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(next, Next::Fetch(record) if record.canonical == "http://a.com/"));
}

/// Links every seed to two pages, one malformed link and one deep embed
struct LinkingFetcher {
    attempts: Mutex<HashSet<String>>,
}

#[async_trait]
impl Fetcher for LinkingFetcher {
    async fn fetch(&self, record: &UriRecord) -> FetchReport {
        // Every record fails once before succeeding
        let first_attempt = self.attempts.lock().unwrap().insert(record.canonical.clone());
        if first_attempt {
            return FetchReport {
                outcome: FetchOutcome::connection_failed(Duration::from_millis(1)),
                outlinks: Vec::new(),
            };
        }

        let outlinks = if record.is_seed {
            vec![
                UriRecord::outlink(record, format!("{}one", record.canonical), Hop::Navlink),
                UriRecord::outlink(record, format!("{}two", record.canonical), Hop::Navlink),
                UriRecord::outlink(record, "mailto:someone@example.com", Hop::Navlink),
                UriRecord::discovered(
                    format!("{}embed.js", record.canonical),
                    "LEXX",
                    Some(record.uri.clone()),
                    false,
                ),
            ]
        } else {
            Vec::new()
        };

        FetchReport {
            outcome: success(),
            outlinks,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_workers_retries_and_follows_outlinks() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config(temp.path());
    config.scope.max_trans_hops = 2;
    let frontier = Arc::new(Frontier::new(config).unwrap());
    schedule_all(&frontier, &["http://a.com/", "http://b.com/"]);

    let fetcher = Arc::new(LinkingFetcher {
        attempts: Mutex::new(HashSet::new()),
    });
    let summary = run_workers(Arc::clone(&frontier), fetcher, 3)
        .await
        .unwrap();

    // Two seeds plus four pages, each fetched twice
    assert_eq!(summary.fetched, 12);
    assert_eq!(summary.outlinks_accepted, 4);

    let stats = frontier.stats();
    assert_eq!(stats.succeeded, 6);
    assert_eq!(stats.retried, 6);
    assert_eq!(stats.out_of_scope, 2);
    assert_eq!(stats.queued, 0);
    assert!(frontier.has_seen("http://a.com/two").unwrap());
}
