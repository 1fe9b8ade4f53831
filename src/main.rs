//! Sumi-Frontier main entry point
//!
//! Command-line tooling around the frontier: validate a configuration,
//! seed a frontier, inspect checkpoints and compact the journal.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use sumi_frontier::config::{load_config_with_hash, Config};
use sumi_frontier::output::{checkpoint_statistics, print_statistics};
use sumi_frontier::state::UriRecord;
use sumi_frontier::storage::checkpoint::{find_latest, has_checkpoints};
use sumi_frontier::{Frontier, ScheduleOutcome};
use tracing_subscriber::EnvFilter;

/// Sumi-Frontier: the polite crawl frontier
///
/// Sumi-Frontier keeps the set of URIs a crawl has discovered, decides
/// which one to fetch next while keeping each host polite, and persists
/// its state through a journal and checkpoints.
#[derive(Parser, Debug)]
#[command(name = "sumi-frontier")]
#[command(version = "1.0.0")]
#[command(about = "A polite, durable crawl frontier", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and print the effective settings (default)
    #[arg(long, conflicts_with_all = ["stats", "compact", "seed"])]
    dry_run: bool,

    /// Show statistics from a checkpoint or catalogue directory and exit
    #[arg(long, value_name = "CHECKPOINT", conflicts_with_all = ["dry_run", "compact", "seed"])]
    stats: Option<PathBuf>,

    /// Recover from a checkpoint or catalogue plus the journal, then write
    /// a fresh checkpoint into the configured catalogue
    #[arg(long, value_name = "CHECKPOINT", conflicts_with_all = ["dry_run", "stats", "seed"])]
    compact: Option<PathBuf>,

    /// Schedule the seed URIs listed in FILE (one per line) and checkpoint
    #[arg(long, value_name = "FILE", conflicts_with_all = ["dry_run", "stats", "compact"])]
    seed: Option<PathBuf>,

    /// With --seed, add to the recovered frontier instead of a fresh one.
    /// Without it, the checkpoint catalogue must be empty.
    #[arg(long, requires = "seed")]
    resume: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if let Some(checkpoint) = &cli.stats {
        handle_stats(checkpoint)
    } else if let Some(checkpoint) = &cli.compact {
        handle_compact(config, checkpoint)
    } else if let Some(seeds) = &cli.seed {
        handle_seed(config, seeds, cli.resume)
    } else {
        handle_dry_run(&config);
        Ok(())
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_frontier=info,warn"),
            1 => EnvFilter::new("sumi_frontier=debug,info"),
            2 => EnvFilter::new("sumi_frontier=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Frontier Dry Run ===\n");

    println!("Politeness:");
    println!("  Min delay: {}ms", config.politeness.min_delay_ms);
    println!("  Max delay: {}ms", config.politeness.max_delay_ms);
    println!("  Delay factor: {}", config.politeness.delay_factor);
    println!("  Max retries: {}", config.politeness.max_retries);

    println!("\nScheduler:");
    println!("  Selection: {:?}", config.scheduler.selection);
    println!("  Queue key: {:?}", config.scheduler.queue_key);
    println!("  Max busy queues: {}", config.scheduler.max_busy_queues);
    println!("  Max open queues: {}", config.scheduler.max_open_queues);
    println!("  Max queued URIs: {}", config.scheduler.max_queued_uris);

    println!("\nScope:");
    println!("  Max link hops: {}", config.scope.max_link_hops);
    println!("  Max trans hops: {}", config.scope.max_trans_hops);
    println!("  Hop policy: {:?}", config.scope.hop_policy);

    println!("\nStorage:");
    println!("  Fingerprints: {:?}", config.storage.fingerprints);
    println!("  Queues: {:?}", config.storage.queues);
    println!("  Work directory: {}", config.storage.work_dir);

    println!("\nCheckpoints:");
    println!("  Catalogue: {}", config.checkpoint.dir);
    println!("  Journal: {}", config.checkpoint.journal_path);
    println!("  Journal sync: {:?}", config.checkpoint.journal_sync);

    let rules = config.canonicalization.active_rules();
    println!("\nCanonicalization Rules ({}):", rules.len());
    for rule in &rules {
        println!("  - {:?}", rule);
    }

    println!("\nHost Overrides ({}):", config.host_overrides.len());
    for entry in &config.host_overrides {
        println!("  - {}", entry.pattern);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: prints statistics from a checkpoint
fn handle_stats(dir: &Path) -> Result<()> {
    let checkpoint = find_latest(dir)?
        .with_context(|| format!("No valid checkpoint under {}", dir.display()))?;

    println!("Checkpoint: {}", checkpoint.path.display());
    println!("Stamped at: {}\n", checkpoint.stamped_at.to_rfc3339());

    let stats = checkpoint_statistics(&checkpoint)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --compact mode: folds the journal into a new checkpoint
///
/// The new checkpoint starts a fresh journal segment, and segments already
/// covered by the oldest checkpoint in the catalogue are deleted.
fn handle_compact(config: Config, checkpoint: &Path) -> Result<()> {
    let frontier = Frontier::recover(config, checkpoint)
        .with_context(|| format!("Failed to recover from {}", checkpoint.display()))?;

    let path = frontier.checkpoint_now()?;
    println!("✓ Checkpoint written to: {}", path.display());
    Ok(())
}

/// Handles the --seed mode: schedules seeds and checkpoints the result
fn handle_seed(config: Config, seeds: &Path, resume: bool) -> Result<()> {
    let content = fs::read_to_string(seeds)
        .with_context(|| format!("Failed to read seeds from {}", seeds.display()))?;

    let frontier = if resume {
        let catalogue = PathBuf::from(&config.checkpoint.dir);
        if find_latest(&catalogue)?.is_some() {
            Frontier::recover(config, &catalogue)?
        } else {
            tracing::info!("No checkpoint in {}, replaying the journal", catalogue.display());
            Frontier::recover_from_journal(config)?
        }
    } else {
        ensure_empty_catalogue(&config)?;
        Frontier::new(config)?
    };

    let mut accepted = 0usize;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match frontier.schedule(UriRecord::seed(line)) {
            Ok(ScheduleOutcome::Accepted) => accepted += 1,
            Ok(outcome) => tracing::info!("Seed {} not queued: {:?}", line, outcome),
            Err(e) => tracing::warn!("Skipping seed {}: {}", line, e),
        }
    }
    tracing::info!("Scheduled {} seeds", accepted);

    let path = frontier.checkpoint_now()?;
    println!("✓ {} seeds queued, checkpoint written to: {}", accepted, path.display());
    Ok(())
}

/// Refuses to start a fresh frontier next to another run's checkpoints
///
/// A fresh frontier truncates the journal, so recovery from an older
/// checkpoint in the catalogue would replay the wrong journal.
fn ensure_empty_catalogue(config: &Config) -> Result<()> {
    let catalogue = Path::new(&config.checkpoint.dir);
    if has_checkpoints(catalogue)? {
        bail!(
            "Checkpoint catalogue {} is not empty; use --resume or remove it first",
            catalogue.display()
        );
    }
    Ok(())
}
