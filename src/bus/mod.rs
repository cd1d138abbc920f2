//! Relay queue between the change relay and the projector.
//!
//! This module contains:
//! - `RelayQueue` trait: at-least-once queue with per-message ack/nack
//! - `RelayMessage`: the unit placed on the queue
//! - Queue configuration types
//! - Implementations: in-process channel, SQS, chaos wrapper for testing

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::EventRecord;

pub mod channel;
#[cfg(feature = "chaos")]
pub mod chaotic;
#[cfg(feature = "sqs")]
pub mod sqs;

pub use channel::ChannelQueue;
#[cfg(feature = "chaos")]
pub use chaotic::{ChaosStats, ChaoticQueue};
#[cfg(feature = "sqs")]
pub use sqs::SqsQueue;

// ============================================================================
// Messages
// ============================================================================

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur during queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Acknowledge failed: {0}")]
    Ack(String),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Unknown or expired receipt: {0}")]
    UnknownReceipt(String),

    #[error("Queue backend not available: {0}")]
    Unavailable(String),
}

/// One relayed event: `{aggregateId, version, eventData}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    pub aggregate_id: String,
    pub version: u64,
    pub event_data: serde_json::Value,
}

impl RelayMessage {
    /// Build the message for a committed Event Record.
    ///
    /// Stored data that is not JSON is carried as a JSON string so it still
    /// reaches the projector, which flags it.
    pub fn from_record(record: &EventRecord) -> Self {
        let event_data = serde_json::from_str(&record.data)
            .unwrap_or_else(|_| serde_json::Value::String(record.data.clone()));
        Self {
            aggregate_id: record.aggregate_id.clone(),
            version: record.version,
            event_data,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A received message, held invisible to other consumers until acked,
/// nacked, or its visibility timeout lapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle used to ack or nack this delivery.
    pub receipt: String,
    /// Raw message body.
    pub body: String,
    /// How many times this message has been received, including this one.
    pub receive_count: u32,
}

/// Addressing fields of a relay message.
///
/// Readable whenever the body names an aggregate and a version, even if
/// the rest of the envelope is broken.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    pub aggregate_id: String,
    pub version: u64,
}

impl Delivery {
    pub fn decode(&self) -> std::result::Result<RelayMessage, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn decode_header(&self) -> std::result::Result<MessageHeader, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Interface for the relay queue.
///
/// Delivery is at-least-once with no ordering guarantee. A received message
/// that is neither acked nor nacked becomes visible again after the
/// backend's visibility timeout.
///
/// Implementations:
/// - `ChannelQueue`: In-process, for standalone mode and tests
/// - `SqsQueue`: AWS SQS
/// - `ChaoticQueue`: Wrapper that duplicates and reorders deliveries
#[async_trait]
pub trait RelayQueue: Send + Sync {
    async fn send(&self, message: &RelayMessage) -> Result<()>;

    /// Receive up to `max` messages, waiting at most `wait` for the first.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>>;

    /// Remove a delivered message from the queue.
    async fn ack(&self, receipt: &str) -> Result<()>;

    /// Return a delivered message to the queue, visible again after `delay`.
    async fn nack(&self, receipt: &str, delay: Duration) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Queue type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    /// In-process queue (no external broker).
    #[default]
    Channel,
    /// AWS SQS.
    Sqs,
}

/// In-process queue configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelQueueConfig {
    /// How long a received message stays invisible before redelivery.
    pub visibility_timeout_ms: u64,
}

impl Default for ChannelQueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_ms: 30_000,
        }
    }
}

/// AWS SQS configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqsConfig {
    /// AWS region. Uses the default provider chain if not set.
    pub region: Option<String>,
    /// Custom endpoint URL (for LocalStack or testing).
    pub endpoint_url: Option<String>,
}

/// Duplication and reordering applied on top of the configured queue.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    /// Probability (0.0 to 1.0) that a sent message is enqueued twice.
    pub duplicate_rate: f64,
    /// Shuffle each received batch.
    pub shuffle: bool,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Queue type discriminator.
    #[serde(rename = "type")]
    pub queue_type: QueueType,
    /// In-process queue configuration.
    pub channel: ChannelQueueConfig,
    /// SQS configuration.
    pub sqs: SqsConfig,
    /// Optional chaos wrapper (requires the `chaos` feature).
    pub chaos: Option<ChaosConfig>,
}

/// Initialize the relay queue based on configuration.
///
/// `queue_name` is the configured relay queue identifier; for SQS it is the
/// queue URL.
pub async fn init_queue(config: &MessagingConfig, queue_name: &str) -> Result<Arc<dyn RelayQueue>> {
    let queue: Arc<dyn RelayQueue> = match config.queue_type {
        QueueType::Channel => {
            info!(queue = %queue_name, "Relay queue: in-process channel");
            let visibility = Duration::from_millis(config.channel.visibility_timeout_ms);
            match &config.chaos {
                #[cfg(feature = "chaos")]
                Some(chaos) => Arc::new(ChaoticQueue::new(
                    ChannelQueue::new(visibility),
                    chaos.clone(),
                )),
                _ => Arc::new(ChannelQueue::new(visibility)),
            }
        }
        #[cfg(feature = "sqs")]
        QueueType::Sqs => {
            let queue = SqsQueue::connect(&config.sqs, queue_name).await;
            match &config.chaos {
                #[cfg(feature = "chaos")]
                Some(chaos) => Arc::new(ChaoticQueue::new(queue, chaos.clone())),
                _ => Arc::new(queue),
            }
        }
        #[cfg(not(feature = "sqs"))]
        QueueType::Sqs => {
            tracing::error!("SQS requested but 'sqs' feature is not enabled");
            return Err(QueueError::Unavailable("sqs feature not enabled".to_string()));
        }
    };

    #[cfg(not(feature = "chaos"))]
    if config.chaos.is_some() {
        tracing::warn!("Chaos queue configured but 'chaos' feature is not enabled; ignoring");
    }

    Ok(queue)
}

#[cfg(test)]
mod tests;
