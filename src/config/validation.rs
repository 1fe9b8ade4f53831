use crate::config::types::{
    CanonicalizationConfig, CheckpointConfig, Config, HostOverride, PolitenessConfig,
    SchedulerConfig, StorageConfig,
};
use crate::ConfigError;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_politeness(&config.politeness)?;
    validate_scheduler(&config.scheduler)?;
    validate_storage(&config.storage)?;
    validate_checkpoint(&config.checkpoint)?;
    validate_canonicalization(&config.canonicalization)?;
    validate_host_overrides(&config.host_overrides, &config.politeness)?;
    Ok(())
}

fn validate_politeness(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min-delay-ms ({}) must not exceed max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    validate_delay_factor(config.delay_factor)
}

fn validate_delay_factor(factor: f64) -> Result<(), ConfigError> {
    if !factor.is_finite() || factor < 0.0 {
        return Err(ConfigError::Validation(format!(
            "delay-factor must be a finite number >= 0, got {}",
            factor
        )));
    }
    Ok(())
}

fn validate_scheduler(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll-interval-ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }
    Ok(())
}

fn validate_storage(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.needs_database() && config.work_dir.is_empty() {
        return Err(ConfigError::Validation(
            "work-dir cannot be empty when a disk-backed store is selected".to_string(),
        ));
    }

    if config.fingerprint_cache_size < 1 {
        return Err(ConfigError::Validation(
            "fingerprint-cache-size must be >= 1".to_string(),
        ));
    }

    if config.queue_memory_threshold < 1 {
        return Err(ConfigError::Validation(
            "queue-memory-threshold must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_checkpoint(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if config.dir.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint dir cannot be empty".to_string(),
        ));
    }

    if config.journal_path.is_empty() {
        return Err(ConfigError::Validation(
            "journal-path cannot be empty".to_string(),
        ));
    }

    if config.journal_sync_every < 1 {
        return Err(ConfigError::Validation(
            "journal-sync-every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_canonicalization(config: &CanonicalizationConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in &config.rules {
        if !seen.insert(entry.rule) {
            return Err(ConfigError::Validation(format!(
                "canonicalization rule '{}' is listed more than once",
                entry.rule.name()
            )));
        }
    }
    Ok(())
}

fn validate_host_overrides(
    overrides: &[HostOverride],
    base: &PolitenessConfig,
) -> Result<(), ConfigError> {
    for entry in overrides {
        validate_host_pattern(&entry.pattern)?;

        let min = entry.min_delay_ms.unwrap_or(base.min_delay_ms);
        let max = entry.max_delay_ms.unwrap_or(base.max_delay_ms);
        if min > max {
            return Err(ConfigError::Validation(format!(
                "override '{}': min-delay-ms ({}) exceeds max-delay-ms ({})",
                entry.pattern, min, max
            )));
        }

        if let Some(factor) = entry.delay_factor {
            validate_delay_factor(factor)?;
        }
    }
    Ok(())
}

/// Validates a host pattern (supports a leading `*.` wildcard)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    let host = pattern.strip_prefix("*.").unwrap_or(pattern);

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(format!(
            "Host pattern '{}' has no host",
            pattern
        )));
    }

    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            host
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            host
        )));
    }

    if host != host.to_ascii_lowercase() {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' must be lowercase",
            host
        )));
    }

    Ok(())
}
