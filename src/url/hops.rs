use crate::state::Hop;
use serde::Deserialize;
use std::fmt;

/// How the link-hop and trans-hop limits combine into a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HopPolicy {
    /// Reject when either limit is exceeded
    Either,
    /// Reject only when both limits are exceeded
    Both,
}

/// Why a discovery path was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRejection {
    TooManyLinkHops { hops: u32, max: u32 },
    TooManyTransHops { hops: u32, max: u32 },
    TooManyHops { link_hops: u32, trans_hops: u32 },
}

impl fmt::Display for ScopeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyLinkHops { hops, max } => {
                write!(f, "{} link hops exceeds limit of {}", hops, max)
            }
            Self::TooManyTransHops { hops, max } => {
                write!(f, "{} trailing trans hops exceeds limit of {}", hops, max)
            }
            Self::TooManyHops {
                link_hops,
                trans_hops,
            } => write!(
                f,
                "{} link hops and {} trans hops both exceed their limits",
                link_hops, trans_hops
            ),
        }
    }
}

/// Number of navlink hops anywhere in the path
pub fn link_hops(path: &str) -> u32 {
    let navlink = Hop::Navlink.code();
    path.chars().filter(|&c| c == navlink).count() as u32
}

/// Length of the trailing run of non-navlink hops
///
/// Counting stops at the last navlink or at the start of the path, so
/// `"LEX"` has two trans hops and `"ERLE"` has one.
pub fn trans_hops(path: &str) -> u32 {
    let navlink = Hop::Navlink.code();
    path.chars().rev().take_while(|&c| c != navlink).count() as u32
}

/// Hop-count scope limits
#[derive(Debug, Clone, Copy)]
pub struct HopLimits {
    pub max_link_hops: u32,
    pub max_trans_hops: u32,
    pub policy: HopPolicy,
}

impl HopLimits {
    /// Checks a discovery path against the limits
    ///
    /// A count equal to its limit is accepted; only exceeding it counts.
    pub fn check(&self, path: &str) -> Result<(), ScopeRejection> {
        let links = link_hops(path);
        let trans = trans_hops(path);
        let links_over = links > self.max_link_hops;
        let trans_over = trans > self.max_trans_hops;

        match self.policy {
            HopPolicy::Either if links_over => Err(ScopeRejection::TooManyLinkHops {
                hops: links,
                max: self.max_link_hops,
            }),
            HopPolicy::Either if trans_over => Err(ScopeRejection::TooManyTransHops {
                hops: trans,
                max: self.max_trans_hops,
            }),
            HopPolicy::Both if links_over && trans_over => Err(ScopeRejection::TooManyHops {
                link_hops: links,
                trans_hops: trans,
            }),
            _ => Ok(()),
        }
    }
}
