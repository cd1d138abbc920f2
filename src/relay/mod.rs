//! Change relay: forwards committed Event Records to the relay queue.
//!
//! Reads the Event Log's change feed in commit order. Version-record
//! notifications carry no event and are acknowledged without forwarding.
//! An event notification is acknowledged only after its message is on the
//! queue, so every committed event is forwarded at least once.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{QueueError, RelayMessage, RelayQueue};
use crate::storage::{ChangeFeed, ChangeRecord, StorageError};
use crate::utils::retry::relay_backoff;

/// Errors that stop a relay pass.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Change feed error: {0}")]
    Feed(#[from] StorageError),

    #[error("Failed to enqueue {aggregate_id} v{version}: {source}")]
    Enqueue {
        aggregate_id: String,
        version: u64,
        #[source]
        source: QueueError,
    },
}

/// Change relay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Notifications read per pass.
    pub batch_size: usize,
    /// Pause between passes when the feed is drained.
    pub poll_interval_ms: u64,
    /// Send retries before a pass gives up.
    pub max_send_retries: usize,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            poll_interval_ms: 100,
            max_send_retries: 5,
            min_backoff_ms: 20,
            max_backoff_ms: 1_000,
        }
    }
}

/// What one pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    /// Event notifications placed on the queue.
    pub forwarded: usize,
    /// Version-record notifications acknowledged without forwarding.
    pub skipped: usize,
}

impl RelayReport {
    pub fn total(&self) -> usize {
        self.forwarded + self.skipped
    }
}

/// Forwards the change feed to the relay queue.
pub struct ChangeRelay {
    feed: Arc<dyn ChangeFeed>,
    queue: Arc<dyn RelayQueue>,
    config: RelayConfig,
}

impl ChangeRelay {
    pub fn new(feed: Arc<dyn ChangeFeed>, queue: Arc<dyn RelayQueue>, config: RelayConfig) -> Self {
        Self {
            feed,
            queue,
            config,
        }
    }

    /// Relay up to `batch_size` pending notifications, strictly in feed order.
    ///
    /// A send that still fails after the retry budget ends the pass; that
    /// notification and everything after it stay unacknowledged for the
    /// next pass.
    pub async fn relay_pending(&self) -> Result<RelayReport, RelayError> {
        let changes = self.feed.poll(self.config.batch_size).await?;
        let mut report = RelayReport::default();

        for notification in changes {
            match &notification.change {
                ChangeRecord::AggregateVersion { .. } => {
                    report.skipped += 1;
                }
                ChangeRecord::Event(record) => {
                    let message = RelayMessage::from_record(record);
                    (|| async { self.queue.send(&message).await })
                        .retry(relay_backoff(&self.config))
                        .notify(|err: &QueueError, dur: Duration| {
                            warn!(
                                aggregate_id = %message.aggregate_id,
                                version = message.version,
                                error = %err,
                                delay = ?dur,
                                "Enqueue failed, retrying"
                            );
                        })
                        .await
                        .map_err(|source| RelayError::Enqueue {
                            aggregate_id: record.aggregate_id.clone(),
                            version: record.version,
                            source,
                        })?;
                    debug!(
                        aggregate_id = %record.aggregate_id,
                        version = record.version,
                        "Event relayed"
                    );
                    report.forwarded += 1;
                }
            }
            self.feed.ack(notification.sequence).await?;
        }

        Ok(report)
    }

    /// Relay until the feed is empty.
    pub async fn drain(&self) -> Result<RelayReport, RelayError> {
        let mut total = RelayReport::default();
        loop {
            let report = self.relay_pending().await?;
            if report.total() == 0 {
                return Ok(total);
            }
            total.forwarded += report.forwarded;
            total.skipped += report.skipped;
        }
    }

    /// Run passes until `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let interval = Duration::from_millis(self.config.poll_interval_ms);
            info!(
                batch_size = self.config.batch_size,
                poll_interval_ms = self.config.poll_interval_ms,
                "Change relay started"
            );

            loop {
                if *shutdown.borrow() {
                    info!("Change relay stopped");
                    break;
                }

                match self.relay_pending().await {
                    Ok(report) if report.total() >= self.config.batch_size => continue,
                    Ok(report) if report.forwarded > 0 => {
                        debug!(forwarded = report.forwarded, "Relay pass complete");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Relay pass failed"),
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Change relay stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
