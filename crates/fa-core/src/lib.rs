//! Fuzzing Agent Core Library
//!
//! This library provides the target supervisor behind `fa-agent`:
//! - Process discovery through the process filesystem
//! - Traced launch and attach of targets
//! - The per-monitor supervision loop and target state machine
//! - The TCP/JSON command protocol
//! - Exit codes and logging for the binary
//!
//! The binary entry point is in `main.rs`.

pub mod action;
pub mod collect;
pub mod exit_codes;
pub mod logging;
pub mod protocol;
pub mod supervision;

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
