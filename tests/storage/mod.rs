//! Shared storage integration tests.
//!
//! Tests the EventLog, ChangeFeed and ReadModelStore interfaces against all
//! implementations. Each implementation module imports these test functions
//! and runs them.

pub mod event_log_tests;
pub mod read_model_tests;
