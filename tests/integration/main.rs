//! Integration tests for the frontier
//!
//! These tests drive the public facade end to end: concurrent workers,
//! politeness, draining, checkpoints and recovery.

mod common;
mod frontier_tests;
mod recovery_tests;
