//! AWS SQS relay queue.
//!
//! The configured relay queue identifier is the queue URL. Receipt handles
//! map directly to `delete_message` (ack) and `change_message_visibility`
//! (nack).

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client as SqsClient;
use tracing::{debug, info};

use super::{Delivery, QueueError, RelayMessage, RelayQueue, Result, SqsConfig};

/// SQS caps a single receive at ten messages and a long poll at twenty seconds.
const MAX_RECEIVE_BATCH: usize = 10;
const MAX_WAIT_SECS: u64 = 20;
/// Longest visibility timeout SQS accepts, twelve hours.
const MAX_VISIBILITY_SECS: u64 = 43_200;

/// Relay queue backed by an SQS queue.
pub struct SqsQueue {
    client: SqsClient,
    queue_url: String,
}

impl SqsQueue {
    /// Build a client from the default provider chain plus the configured
    /// region and endpoint overrides.
    pub async fn connect(config: &SqsConfig, queue_url: &str) -> Self {
        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            aws_config_builder =
                aws_config_builder.region(aws_config::Region::new(region.clone()));
        }

        if let Some(ref endpoint) = config.endpoint_url {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;

        info!(
            region = ?config.region,
            endpoint = ?config.endpoint_url,
            queue_url = %queue_url,
            "Relay queue: AWS SQS"
        );

        Self {
            client: SqsClient::new(&aws_config),
            queue_url: queue_url.to_string(),
        }
    }
}

/// SQS visibility is whole seconds; round up so a message never returns early.
fn visibility_secs(delay: Duration) -> i32 {
    let secs = (delay.as_millis().div_ceil(1000) as u64).min(MAX_VISIBILITY_SECS);
    secs as i32
}

#[async_trait]
impl RelayQueue for SqsQueue {
    async fn send(&self, message: &RelayMessage) -> Result<()> {
        let body = message.encode()?;
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Send(e.to_string()))?;
        debug!(
            aggregate_id = %message.aggregate_id,
            version = message.version,
            "Sent to SQS"
        );
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max.clamp(1, MAX_RECEIVE_BATCH) as i32)
            .wait_time_seconds(wait.as_secs().min(MAX_WAIT_SECS) as i32)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| QueueError::Receive(e.to_string()))?;

        let deliveries = output
            .messages()
            .iter()
            .filter_map(|message| {
                let receipt = message.receipt_handle()?.to_string();
                let receive_count = message
                    .attributes()
                    .and_then(|attrs| {
                        attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount)
                    })
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);
                Some(Delivery {
                    receipt,
                    body: message.body().unwrap_or_default().to_string(),
                    receive_count,
                })
            })
            .collect();

        Ok(deliveries)
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))?;
        Ok(())
    }

    async fn nack(&self, receipt: &str, delay: Duration) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(visibility_secs(delay))
            .send()
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))?;
        Ok(())
    }
}
