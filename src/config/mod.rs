//! Configuration module for the frontier
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. The resulting [`Config`] is immutable and handed to the frontier
//! at construction time.
//!
//! # Example
//!
//! ```no_run
//! use sumi_frontier::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("frontier.toml")).unwrap();
//! println!("Max trans hops: {}", config.scope.max_trans_hops);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    CanonicalizationConfig, CheckpointConfig, Config, FingerprintBackend, HostOverride,
    JournalSync, PolitenessConfig, QueueBackend, RuleEntry, SchedulerConfig, ScopeConfig,
    StorageConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
