//! Dead letter infrastructure.
//!
//! Events that can never be folded (malformed payloads, undecodable relay
//! envelopes) are flagged here instead of being dropped or blocking their
//! aggregate. The projector publishes a dead letter before acknowledging
//! the message that carried it.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Errors that can occur during DLQ operations.
#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("Failed to publish dead letter: {0}")]
    PublishFailed(String),
}

/// Why a message was dead-lettered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadLetterReason {
    /// The event payload did not decode; its version was consumed as a no-op.
    MalformedEvent(String),
    /// The relay envelope itself did not decode.
    UndecodableMessage(String),
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeadLetterReason::MalformedEvent(detail) => write!(f, "malformed event: {detail}"),
            DeadLetterReason::UndecodableMessage(detail) => {
                write!(f, "undecodable message: {detail}")
            }
        }
    }
}

/// A flagged message, kept for manual review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub aggregate_id: Option<String>,
    pub version: Option<u64>,
    /// Raw message body as received.
    pub body: String,
    pub reason: DeadLetterReason,
    /// RFC 3339 timestamp.
    pub flagged_at: String,
}

impl DeadLetter {
    /// A relayed event whose payload failed to decode.
    pub fn malformed_event(
        aggregate_id: &str,
        version: u64,
        body: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            aggregate_id: Some(aggregate_id.to_string()),
            version: Some(version),
            body: body.into(),
            reason: DeadLetterReason::MalformedEvent(detail.into()),
            flagged_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A message that is not a relay envelope at all.
    pub fn undecodable(body: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            aggregate_id: None,
            version: None,
            body: body.into(),
            reason: DeadLetterReason::UndecodableMessage(detail.into()),
            flagged_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Destination for dead letters.
///
/// Implementations:
/// - `LoggingDeadLetterSink`: Logs each dead letter at error level
/// - `MemoryDeadLetterSink`: Keeps dead letters for inspection
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError>;
}

/// Sink that only logs.
///
/// Used when no durable DLQ is configured.
pub struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        error!(
            aggregate_id = ?dead_letter.aggregate_id,
            version = ?dead_letter.version,
            reason = %dead_letter.reason,
            body = %dead_letter.body,
            "Dead letter"
        );
        Ok(())
    }
}

/// In-memory sink.
///
/// Used for standalone mode and testing.
#[derive(Default)]
pub struct MemoryDeadLetterSink {
    letters: RwLock<Vec<DeadLetter>>,
    fail: RwLock<bool>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }

    /// Make `publish` fail.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        if *self.fail.read().await {
            return Err(DlqError::PublishFailed("injected failure".to_string()));
        }
        info!(
            aggregate_id = ?dead_letter.aggregate_id,
            version = ?dead_letter.version,
            reason = %dead_letter.reason,
            "Recording dead letter"
        );
        self.letters.write().await.push(dead_letter);
        Ok(())
    }
}
