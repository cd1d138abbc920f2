//! Shared helpers for binaries and pipeline stages.

pub mod bootstrap;
pub mod retry;
