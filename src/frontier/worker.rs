//! Worker pool driving a fetcher against the frontier
//!
//! Each worker loops `next()` -> fetch -> `schedule()` outlinks ->
//! `finished()` until the frontier is exhausted or shutting down.

use crate::frontier::{Frontier, Next, ScheduleOutcome};
use crate::state::{FetchOutcome, UriRecord};
use crate::{FrontierError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What a fetcher learned from one record
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub outcome: FetchOutcome,
    /// Links discovered in the fetched content
    pub outlinks: Vec<UriRecord>,
}

/// Fetches a record and extracts its outlinks
///
/// Failures are reported through the outcome, never as an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, record: &UriRecord) -> FetchReport;
}

/// Totals across every worker of a pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub fetched: u64,
    pub outlinks_accepted: u64,
}

/// Runs `workers` workers until the frontier ends or shuts down
///
/// Seed the frontier before calling this; an empty frontier ends at once.
/// If a worker fails, the frontier is terminated so the others stop, and
/// the first error is returned.
pub async fn run_workers(
    frontier: Arc<Frontier>,
    fetcher: Arc<dyn Fetcher>,
    workers: usize,
) -> Result<WorkerSummary> {
    let workers = workers.max(1);
    let mut tasks = JoinSet::new();
    for id in 0..workers {
        let frontier = Arc::clone(&frontier);
        let fetcher = Arc::clone(&fetcher);
        tasks.spawn(async move { work(id, frontier, fetcher).await });
    }
    info!("Started {} workers", workers);

    let mut summary = WorkerSummary::default();
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined
            .unwrap_or_else(|e| Err(FrontierError::Fatal(format!("worker panicked: {}", e))));
        match result {
            Ok(done) => {
                summary.fetched += done.fetched;
                summary.outlinks_accepted += done.outlinks_accepted;
            }
            Err(e) => {
                warn!("Worker failed: {}", e);
                frontier.terminate();
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!(
                "Workers stopped after {} fetches ({} new outlinks)",
                summary.fetched, summary.outlinks_accepted
            );
            Ok(summary)
        }
    }
}

async fn work(id: usize, frontier: Arc<Frontier>, fetcher: Arc<dyn Fetcher>) -> Result<WorkerSummary> {
    let mut summary = WorkerSummary::default();

    loop {
        let record = match frontier.next().await? {
            Next::Fetch(record) => record,
            Next::Ended => {
                debug!("Worker {} found the frontier exhausted", id);
                break;
            }
            Next::ShuttingDown => {
                debug!("Worker {} shutting down", id);
                break;
            }
        };

        let report = fetcher.fetch(&record).await;

        for link in report.outlinks {
            match frontier.schedule(link) {
                Ok(ScheduleOutcome::Accepted) => summary.outlinks_accepted += 1,
                Ok(_) => {}
                Err(FrontierError::Url(e)) => {
                    debug!("Skipping outlink of {}: {}", record.canonical, e)
                }
                // Outlinks found after terminate() are dropped
                Err(FrontierError::Terminated) => {}
                Err(e) => return Err(e),
            }
        }

        frontier.finished(&record, report.outcome)?;
        summary.fetched += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lock;
    use crate::state::Hop;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Serves three pages per seed and records per-key overlap
    #[derive(Default)]
    struct SiteFetcher {
        active: Mutex<HashSet<String>>,
        overlaps: AtomicU64,
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetcher for SiteFetcher {
        async fn fetch(&self, record: &UriRecord) -> FetchReport {
            if !lock(&self.active).insert(record.key.clone()) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            lock(&self.active).remove(&record.key);
            lock(&self.fetched).push(record.canonical.clone());

            let outlinks = if record.is_seed {
                (0..3)
                    .map(|i| {
                        let uri = format!("{}page{}", record.canonical, i);
                        UriRecord::outlink(record, uri, Hop::Navlink)
                    })
                    .collect()
            } else {
                // Every page links back to its seed
                vec![UriRecord::outlink(
                    record,
                    record.via.clone().unwrap_or_default(),
                    Hop::Navlink,
                )]
            };

            FetchReport {
                outcome: FetchOutcome::success(Duration::from_millis(2)),
                outlinks,
            }
        }
    }

    fn fast_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.politeness.min_delay_ms = 0;
        config.politeness.max_delay_ms = 0;
        config.politeness.delay_factor = 0.0;
        config.scheduler.poll_interval_ms = 20;
        config.checkpoint.journal_path = dir.join("frontier.journal").display().to_string();
        config.storage.work_dir = dir.join("work").display().to_string();
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_crawls_every_page_once() {
        let temp = TempDir::new().unwrap();
        let frontier = Arc::new(Frontier::new(fast_config(temp.path())).unwrap());
        for seed in ["http://a.com/", "http://b.com/", "http://c.com/"] {
            frontier.schedule(UriRecord::seed(seed)).unwrap();
        }

        let fetcher = Arc::new(SiteFetcher::default());
        let summary = run_workers(Arc::clone(&frontier), fetcher.clone(), 6)
            .await
            .unwrap();

        assert_eq!(summary.fetched, 12);
        assert_eq!(summary.outlinks_accepted, 9);
        assert_eq!(fetcher.overlaps.load(Ordering::SeqCst), 0);

        let mut fetched = lock(&fetcher.fetched).clone();
        fetched.sort();
        fetched.dedup();
        assert_eq!(fetched.len(), 12);

        let stats = frontier.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.succeeded, 12);
        assert_eq!(stats.duplicates, 9);
    }

    #[tokio::test]
    async fn test_pool_stops_on_terminate() {
        let temp = TempDir::new().unwrap();
        let frontier = Arc::new(Frontier::new(fast_config(temp.path())).unwrap());
        frontier.schedule(UriRecord::seed("http://a.com/")).unwrap();
        frontier.terminate();

        let fetcher = Arc::new(SiteFetcher::default());
        let summary = run_workers(frontier, fetcher, 2).await.unwrap();
        assert_eq!(summary.fetched, 0);
    }

    #[tokio::test]
    async fn test_empty_frontier_ends_at_once() {
        let temp = TempDir::new().unwrap();
        let frontier = Arc::new(Frontier::new(fast_config(temp.path())).unwrap());

        let summary = run_workers(frontier, Arc::new(SiteFetcher::default()), 3)
            .await
            .unwrap();
        assert_eq!(summary, WorkerSummary::default());
    }
}
