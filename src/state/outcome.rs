use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Classification of a completed fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStatus {
    /// The fetch succeeded
    Success,
    /// The fetch failed but may succeed if retried
    Transient,
    /// The fetch failed and must not be retried
    Permanent,
}

impl FetchStatus {
    /// Classifies an HTTP status code
    ///
    /// 2xx and 3xx are successes. 408, 429 and 5xx are transient. Every
    /// other code is permanent.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            200..=399 => Self::Success,
            408 | 429 => Self::Transient,
            500..=599 => Self::Transient,
            _ => Self::Permanent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a worker reports back after processing a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub status: FetchStatus,

    /// HTTP status code, absent when no response was received
    pub status_code: Option<u16>,

    /// Wall-clock time the fetch took
    pub duration: Duration,
}

impl FetchOutcome {
    /// Builds an outcome from a received HTTP status code
    pub fn from_status_code(code: u16, duration: Duration) -> Self {
        Self {
            status: FetchStatus::from_status_code(code),
            status_code: Some(code),
            duration,
        }
    }

    /// A connection-level failure (DNS, refused, reset, timeout)
    pub fn connection_failed(duration: Duration) -> Self {
        Self {
            status: FetchStatus::Transient,
            status_code: None,
            duration,
        }
    }

    /// The fetch was denied by robots policy and never attempted
    pub fn robots_denied() -> Self {
        Self {
            status: FetchStatus::Permanent,
            status_code: None,
            duration: Duration::ZERO,
        }
    }

    pub fn success(duration: Duration) -> Self {
        Self::from_status_code(200, duration)
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    pub fn is_transient(&self) -> bool {
        self.status == FetchStatus::Transient
    }
}

/// What became of a record after `finished()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The fetch succeeded and the record is retired
    Succeeded,
    /// The record went back to the tail of its queue
    Retrying { attempt: u32 },
    /// The record failed permanently or ran out of retries
    Failed,
}
