//! Chaotic relay queue wrapper for testing unreliable delivery.
//!
//! Wraps any `RelayQueue` and duplicates sends and shuffles received
//! batches based on a configurable probability. Useful for checking that
//! the projector converges under at-least-once, unordered delivery.
//!
//! # Example
//!
//! ```ignore
//! use classconnect::bus::{ChannelQueue, ChaoticQueue, ChaosConfig};
//!
//! // Duplicate 30% of messages and shuffle every batch
//! let queue = ChaoticQueue::new(
//!     ChannelQueue::default(),
//!     ChaosConfig { duplicate_rate: 0.3, shuffle: true },
//! );
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use super::{ChaosConfig, Delivery, RelayMessage, RelayQueue, Result};

/// Statistics for the chaotic queue.
#[derive(Debug, Default)]
pub struct ChaosStats {
    /// Messages sent through the wrapper.
    pub sent: AtomicU64,
    /// Extra copies enqueued.
    pub duplicated: AtomicU64,
    /// Received batches that were shuffled.
    pub shuffled: AtomicU64,
}

impl ChaosStats {
    /// Get a snapshot of current stats: (sent, duplicated, shuffled).
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.sent.load(Ordering::Relaxed),
            self.duplicated.load(Ordering::Relaxed),
            self.shuffled.load(Ordering::Relaxed),
        )
    }
}

/// Wrapper that duplicates and reorders messages for testing.
///
/// With `duplicate_rate` 0.0 and `shuffle` off, this is a pure pass-through.
pub struct ChaoticQueue<Q: RelayQueue> {
    inner: Q,
    config: ChaosConfig,
    stats: ChaosStats,
}

impl<Q: RelayQueue> ChaoticQueue<Q> {
    /// Create a new chaotic wrapper around an existing queue.
    pub fn new(inner: Q, mut config: ChaosConfig) -> Self {
        config.duplicate_rate = config.duplicate_rate.clamp(0.0, 1.0);
        if config.duplicate_rate > 0.0 || config.shuffle {
            warn!(
                duplicate_rate = config.duplicate_rate,
                shuffle = config.shuffle,
                "Chaotic relay queue enabled - messages may be duplicated and reordered"
            );
        }
        Self {
            inner,
            config,
            stats: ChaosStats::default(),
        }
    }

    /// Get the underlying queue.
    pub fn inner(&self) -> &Q {
        &self.inner
    }

    /// Get current statistics.
    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }

    fn should_duplicate(&self) -> bool {
        if self.config.duplicate_rate <= 0.0 {
            return false;
        }
        if self.config.duplicate_rate >= 1.0 {
            return true;
        }
        rand::rng().random::<f64>() < self.config.duplicate_rate
    }
}

#[async_trait]
impl<Q: RelayQueue> RelayQueue for ChaoticQueue<Q> {
    async fn send(&self, message: &RelayMessage) -> Result<()> {
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        self.inner.send(message).await?;

        if self.should_duplicate() {
            self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
            debug!(
                aggregate_id = %message.aggregate_id,
                version = message.version,
                "Chaotic queue duplicated message"
            );
            self.inner.send(message).await?;
        }
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        let mut batch = self.inner.receive(max, wait).await?;
        if self.config.shuffle && batch.len() > 1 {
            self.stats.shuffled.fetch_add(1, Ordering::Relaxed);
            batch.shuffle(&mut rand::rng());
        }
        Ok(batch)
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        self.inner.ack(receipt).await
    }

    async fn nack(&self, receipt: &str, delay: Duration) -> Result<()> {
        self.inner.nack(receipt, delay).await
    }
}
