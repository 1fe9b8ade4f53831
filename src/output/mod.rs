//! Reporting on frontier state
//!
//! Statistics can be taken from a running frontier or read back from a
//! checkpoint directory without recovering it.

pub mod stats;

pub use stats::{checkpoint_statistics, print_statistics, FrontierStats};
