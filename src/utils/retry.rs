//! Retry utilities: backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter. Each pipeline stage
//! gets its own bounds from its config section.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::commands::CommandConfig;
use crate::projector::ProjectorConfig;
use crate::relay::RelayConfig;

/// Backoff for command retries (version conflicts, transient store errors).
///
/// Every attempt re-reads the current version, so the delay only needs to
/// spread out competing writers.
pub fn command_backoff(config: &CommandConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_backoff_ms))
        .with_max_delay(Duration::from_millis(config.max_backoff_ms))
        .with_max_times(config.max_retries)
        .with_jitter()
}

/// Backoff for enqueueing relayed events.
pub fn relay_backoff(config: &RelayConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_backoff_ms))
        .with_max_delay(Duration::from_millis(config.max_backoff_ms))
        .with_max_times(config.max_send_retries)
        .with_jitter()
}

/// Backoff for read model persists.
pub fn persist_backoff(config: &ProjectorConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_backoff_ms))
        .with_max_delay(Duration::from_millis(config.max_backoff_ms))
        .with_max_times(config.persist_retries)
        .with_jitter()
}
