//! Receive/project/acknowledge loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{BatchOutcome, Projector};
use crate::bus::{QueueError, RelayQueue};

/// Drives a `Projector` from a `RelayQueue`.
pub struct ProjectorWorker {
    projector: Arc<Projector>,
    queue: Arc<dyn RelayQueue>,
}

impl ProjectorWorker {
    pub fn new(projector: Arc<Projector>, queue: Arc<dyn RelayQueue>) -> Self {
        Self { projector, queue }
    }

    /// Receive one batch, project it, then ack or nack every receipt.
    ///
    /// Acks happen only after the whole batch was projected. Deferred and
    /// failed messages are returned to the queue with the configured delay.
    pub async fn run_once(&self) -> Result<BatchOutcome, QueueError> {
        let config = self.projector.config();
        let deliveries = self
            .queue
            .receive(config.batch_size, Duration::from_millis(config.wait_ms))
            .await?;
        if deliveries.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let outcome = self.projector.project(deliveries).await;
        let retry_delay = Duration::from_millis(config.retry_delay_ms);

        for receipt in &outcome.ack {
            // A lost ack only causes a redelivery, which folds as a duplicate.
            if let Err(e) = self.queue.ack(receipt).await {
                warn!(receipt = %receipt, error = %e, "Ack failed");
            }
        }

        for deferred in &outcome.deferred {
            if deferred.receive_count >= config.gap_warn_after {
                warn!(
                    aggregate_id = %deferred.aggregate_id,
                    version = deferred.version,
                    deliveries = deferred.receive_count,
                    "Event still waiting on an earlier version"
                );
            }
        }

        for receipt in outcome.retry_receipts() {
            if let Err(e) = self.queue.nack(receipt, retry_delay).await {
                warn!(receipt = %receipt, error = %e, "Nack failed, message returns after visibility timeout");
            }
        }

        Ok(outcome)
    }

    /// Run batches until `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                batch_size = self.projector.config().batch_size,
                "Projector worker started"
            );

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    result = self.run_once() => {
                        if let Err(e) = result {
                            error!(error = %e, "Projector receive failed");
                            tokio::time::sleep(Duration::from_millis(
                                self.projector.config().retry_delay_ms,
                            ))
                            .await;
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Projector worker stopped");
        })
    }
}
