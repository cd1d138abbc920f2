//! Projector: folds relayed events into the read model.
//!
//! This module contains:
//! - `fold`: per-aggregate grouping and the version-gated fold
//! - `Projector`: projects one delivered batch and decides per receipt
//!   whether to acknowledge or redeliver
//! - `ProjectorWorker`: receive/project/ack loop over a `RelayQueue`

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::bus::Delivery;
use crate::dlq::{DeadLetter, DeadLetterSink};
use crate::domain::Room;
use crate::storage::{ReadModelStore, StorageError};
use crate::utils::retry::persist_backoff;

pub mod fold;
mod worker;

pub use fold::{fold_pending, group_by_aggregate, FoldOutcome, Grouped, Pending};
pub use worker::ProjectorWorker;

/// Projector configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Messages received per batch.
    pub batch_size: usize,
    /// Long-poll wait for a batch.
    pub wait_ms: u64,
    /// Delay before a deferred or failed message is redelivered.
    pub retry_delay_ms: u64,
    /// Warn when a deferred message has been delivered this many times.
    pub gap_warn_after: u32,
    /// Read model load/save retries on transient errors.
    pub persist_retries: usize,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            wait_ms: 1_000,
            retry_delay_ms: 500,
            gap_warn_after: 5,
            persist_retries: 5,
            min_backoff_ms: 10,
            max_backoff_ms: 1_000,
        }
    }
}

/// A message held back because an earlier version has not been folded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deferred {
    pub receipt: String,
    pub aggregate_id: String,
    pub version: u64,
    pub receive_count: u32,
}

/// Per-receipt decisions for one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Receipts safe to acknowledge: applied, duplicate or dead-lettered.
    pub ack: Vec<String>,
    /// Receipts to redeliver once the missing version shows up.
    pub deferred: Vec<Deferred>,
    /// Receipts to redeliver because their aggregate failed to persist.
    pub failed: Vec<String>,
    pub failed_aggregates: Vec<String>,
    pub applied: usize,
    pub duplicates: usize,
    pub flagged: usize,
}

impl BatchOutcome {
    /// Every receipt that must not be acknowledged.
    pub fn retry_receipts(&self) -> impl Iterator<Item = &str> {
        self.deferred
            .iter()
            .map(|d| d.receipt.as_str())
            .chain(self.failed.iter().map(String::as_str))
    }
}

/// Why one aggregate of a batch could not be projected.
#[derive(Debug, thiserror::Error)]
enum AggregateFailure {
    #[error("read model: {0}")]
    Store(#[from] StorageError),
    #[error("dead letter: {0}")]
    DeadLetter(#[from] crate::dlq::DlqError),
}

/// Folds delivered batches into the read model.
///
/// Exclusive writer of the read model. Each aggregate of a batch is
/// loaded, folded and saved as one unit; the save is conditional on the
/// version loaded, so a concurrent projector can never regress a record.
pub struct Projector {
    read_model: Arc<dyn ReadModelStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    config: ProjectorConfig,
}

impl Projector {
    pub fn new(
        read_model: Arc<dyn ReadModelStore>,
        dead_letters: Arc<dyn DeadLetterSink>,
        config: ProjectorConfig,
    ) -> Self {
        Self {
            read_model,
            dead_letters,
            config,
        }
    }

    pub fn config(&self) -> &ProjectorConfig {
        &self.config
    }

    /// Project one delivered batch.
    ///
    /// Nothing is acknowledged here; the returned outcome lists which
    /// receipts the caller may ack and which must be redelivered, and is
    /// only produced after every aggregate's persist has finished.
    #[tracing::instrument(skip_all, fields(batch = deliveries.len()))]
    pub async fn project(&self, deliveries: Vec<Delivery>) -> BatchOutcome {
        let grouped = group_by_aggregate(deliveries);
        let mut outcome = BatchOutcome::default();

        for undecodable in grouped.undecodable {
            let receipt = undecodable.delivery.receipt.clone();
            let letter = DeadLetter::undecodable(undecodable.delivery.body, undecodable.error);
            match self.dead_letters.publish(letter).await {
                Ok(()) => {
                    outcome.flagged += 1;
                    outcome.ack.push(receipt);
                }
                Err(e) => {
                    error!(receipt = %receipt, error = %e, "Failed to dead-letter undecodable message");
                    outcome.failed.push(receipt);
                }
            }
        }

        // Aggregates are independent units; project them concurrently.
        let results = join_all(grouped.by_aggregate.into_iter().map(|(aggregate_id, pending)| {
            let receipts: Vec<String> = pending.iter().map(|p| p.receipt.clone()).collect();
            async move {
                let result = self.project_aggregate(&aggregate_id, pending).await;
                (aggregate_id, receipts, result)
            }
        }))
        .await;

        for (aggregate_id, receipts, result) in results {
            match result {
                Ok(fold) => {
                    outcome.applied += fold.applied.len();
                    outcome.duplicates += fold.duplicates.len();
                    outcome.flagged += fold.flagged.len();
                    outcome.ack.extend(
                        fold.applied
                            .into_iter()
                            .chain(fold.duplicates)
                            .chain(fold.flagged)
                            .map(|p| p.receipt),
                    );
                    outcome.deferred.extend(fold.deferred.into_iter().map(|p| Deferred {
                        receipt: p.receipt,
                        aggregate_id: p.aggregate_id,
                        version: p.version,
                        receive_count: p.receive_count,
                    }));
                }
                Err(e) => {
                    error!(aggregate_id = %aggregate_id, error = %e, "Projection failed, batch part will be redelivered");
                    outcome.failed.extend(receipts);
                    outcome.failed_aggregates.push(aggregate_id);
                }
            }
        }

        debug!(
            applied = outcome.applied,
            duplicates = outcome.duplicates,
            deferred = outcome.deferred.len(),
            flagged = outcome.flagged,
            failed = outcome.failed.len(),
            "Batch projected"
        );
        outcome
    }

    async fn project_aggregate(
        &self,
        aggregate_id: &str,
        pending: Vec<Pending>,
    ) -> Result<FoldOutcome, AggregateFailure> {
        let current = (|| async { self.read_model.get(aggregate_id).await })
            .retry(persist_backoff(&self.config))
            .when(StorageError::is_transient)
            .notify(|err: &StorageError, dur: Duration| {
                warn!(aggregate_id, error = %err, delay = ?dur, "Read model load failed, retrying");
            })
            .await?
            .unwrap_or_else(|| Room::empty(aggregate_id));
        let prior_version = current.version;

        let fold = fold_pending(current, pending);

        // Flag before persisting: a flagged version is consumed by the save.
        for p in &fold.flagged {
            let detail = match &p.event {
                Err(detail) => detail.clone(),
                Ok(_) => String::new(),
            };
            warn!(aggregate_id, version = p.version, error = %detail, "Malformed event, skipping");
            self.dead_letters
                .publish(DeadLetter::malformed_event(
                    aggregate_id,
                    p.version,
                    p.body.clone(),
                    detail,
                ))
                .await?;
        }

        if fold.advanced() {
            let room = &fold.room;
            (|| async { self.read_model.save(room, prior_version).await })
                .retry(persist_backoff(&self.config))
                .when(StorageError::is_transient)
                .notify(|err: &StorageError, dur: Duration| {
                    warn!(aggregate_id, error = %err, delay = ?dur, "Read model save failed, retrying");
                })
                .await?;
            info!(
                aggregate_id,
                from = prior_version,
                to = room.version,
                "Read model advanced"
            );
        }

        for p in &fold.deferred {
            debug!(
                aggregate_id,
                version = p.version,
                at = fold.room.version,
                "Gap before event, deferring"
            );
        }

        Ok(fold)
    }
}
