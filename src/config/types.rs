use crate::frontier::SelectionPolicy;
use crate::state::Politeness;
use crate::url::{matches_wildcard, CanonRule, HopPolicy, QueueKeyPolicy};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the frontier
///
/// Every section has defaults, so an empty TOML document is a valid
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub politeness: PolitenessConfig,
    pub scheduler: SchedulerConfig,
    pub scope: ScopeConfig,
    pub storage: StorageConfig,
    pub checkpoint: CheckpointConfig,
    pub canonicalization: CanonicalizationConfig,
    #[serde(rename = "host-override")]
    pub host_overrides: Vec<HostOverride>,
}

/// Per-key delay and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    /// Minimum time between two fetches to the same key (milliseconds)
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Maximum time a key is snoozed after a fetch (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied to the duration of the last fetch
    #[serde(rename = "delay-factor")]
    pub delay_factor: f64,

    /// Attempts allowed for a URI that keeps failing transiently
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 3_000,
            max_delay_ms: 30_000,
            delay_factor: 5.0,
            max_retries: 30,
        }
    }
}

/// Ready-queue selection and global caps
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How the next ready queue is chosen
    pub selection: SelectionPolicy,

    /// How a URI is mapped onto its politeness key
    #[serde(rename = "queue-key")]
    pub queue_key: QueueKeyPolicy,

    /// Maximum number of queues held by workers at once (0 = unlimited)
    #[serde(rename = "max-busy-queues")]
    pub max_busy_queues: usize,

    /// Maximum number of live per-key queues (0 = unlimited)
    #[serde(rename = "max-open-queues")]
    pub max_open_queues: usize,

    /// Maximum number of pending URIs across all queues (0 = unlimited)
    #[serde(rename = "max-queued-uris")]
    pub max_queued_uris: u64,

    /// Longest single wait inside `next()` before state is re-examined
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            selection: SelectionPolicy::RoundRobin,
            queue_key: QueueKeyPolicy::HostPort,
            max_busy_queues: 0,
            max_open_queues: 0,
            max_queued_uris: 0,
            poll_interval_ms: 1_000,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Hop-count scope limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Maximum number of navlink hops from the seed
    #[serde(rename = "max-link-hops")]
    pub max_link_hops: u32,

    /// Maximum length of the trailing run of non-navlink hops
    #[serde(rename = "max-trans-hops")]
    pub max_trans_hops: u32,

    /// Whether one or both limits must be exceeded to reject
    #[serde(rename = "hop-policy")]
    pub hop_policy: HopPolicy,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            max_link_hops: 25,
            max_trans_hops: 5,
            hop_policy: HopPolicy::Either,
        }
    }
}

/// Fingerprint set implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintBackend {
    Memory,
    Disk,
}

/// Pending-URI queue implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueBackend {
    Memory,
    Spill,
}

/// Storage backends and the work directory they live in
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub fingerprints: FingerprintBackend,

    /// Hot entries kept in memory in front of the disk fingerprint table
    #[serde(rename = "fingerprint-cache-size")]
    pub fingerprint_cache_size: usize,

    pub queues: QueueBackend,

    /// Pending URIs kept in memory per queue before spilling to disk
    #[serde(rename = "queue-memory-threshold")]
    pub queue_memory_threshold: usize,

    /// Directory holding the SQLite work database
    #[serde(rename = "work-dir")]
    pub work_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            fingerprints: FingerprintBackend::Memory,
            fingerprint_cache_size: 100_000,
            queues: QueueBackend::Memory,
            queue_memory_threshold: 1_000,
            work_dir: "./frontier-work".to_string(),
        }
    }
}

impl StorageConfig {
    /// Path of the SQLite work database
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("frontier.db")
    }

    pub fn needs_database(&self) -> bool {
        self.fingerprints == FingerprintBackend::Disk || self.queues == QueueBackend::Spill
    }
}

/// When journal appends are forced to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JournalSync {
    /// fsync after every entry
    Always,
    /// flush every entry to the OS, fsync every `journal-sync-every` entries
    Batched,
}

/// Journal and checkpoint locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Catalogue directory that `checkpoint_now` writes into
    pub dir: String,

    #[serde(rename = "journal-path")]
    pub journal_path: String,

    #[serde(rename = "journal-sync")]
    pub journal_sync: JournalSync,

    #[serde(rename = "journal-sync-every")]
    pub journal_sync_every: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: "./checkpoints".to_string(),
            journal_path: "./frontier-work/frontier.journal".to_string(),
            journal_sync: JournalSync::Always,
            journal_sync_every: 64,
        }
    }
}

/// One entry of the ordered canonicalization rule list
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
    pub rule: CanonRule,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Ordered list of canonicalization rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CanonicalizationConfig {
    pub rules: Vec<RuleEntry>,
}

impl Default for CanonicalizationConfig {
    fn default() -> Self {
        Self {
            rules: CanonRule::defaults()
                .iter()
                .map(|(rule, enabled)| RuleEntry {
                    rule: *rule,
                    enabled: *enabled,
                })
                .collect(),
        }
    }
}

impl CanonicalizationConfig {
    /// The rules that will actually run, in declared order
    pub fn active_rules(&self) -> Vec<CanonRule> {
        self.rules
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.rule)
            .collect()
    }
}

/// Politeness override for hosts matching a wildcard pattern
#[derive(Debug, Clone, Deserialize)]
pub struct HostOverride {
    /// Host pattern (e.g., "example.com" or "*.example.com")
    pub pattern: String,

    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: Option<u64>,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: Option<u64>,

    #[serde(rename = "delay-factor")]
    pub delay_factor: Option<f64>,
}

impl Config {
    /// Resolves the politeness settings for a queue key
    ///
    /// The first override whose pattern matches the key's host wins; fields
    /// it leaves unset fall back to the `[politeness]` section.
    pub fn politeness_for(&self, key: &str) -> Politeness {
        let base = Politeness::from_config(&self.politeness);
        let host = key_host(key);

        match self
            .host_overrides
            .iter()
            .find(|o| matches_wildcard(&o.pattern, host))
        {
            Some(o) => Politeness {
                min_delay: o
                    .min_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(base.min_delay),
                max_delay: o
                    .max_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(base.max_delay),
                delay_factor: o.delay_factor.unwrap_or(base.delay_factor),
            },
            None => base,
        }
    }
}

/// Strips a trailing `:port` from a queue key, leaving IPv6 literals intact
fn key_host(key: &str) -> &str {
    if key.starts_with('[') {
        return match key.find(']') {
            Some(end) => &key[..=end],
            None => key,
        };
    }
    match key.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => key,
    }
}
