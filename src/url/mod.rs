//! URL handling for the frontier
//!
//! This module turns raw URIs into their canonical form, derives the
//! politeness key a URI is serialized under, matches host override
//! patterns, and applies the hop-count scope policy.

mod canonicalize;
mod hops;
mod key;
mod matcher;

pub use canonicalize::{canonicalize, CanonRule};
pub use hops::{link_hops, trans_hops, HopLimits, HopPolicy, ScopeRejection};
pub use key::QueueKeyPolicy;
pub use matcher::matches_wildcard;
