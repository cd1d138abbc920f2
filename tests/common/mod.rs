//! Shared fixtures for pipeline tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use classconnect::bus::{ChannelQueue, RelayQueue};
use classconnect::commands::{CommandConfig, CommandHandler};
use classconnect::dlq::MemoryDeadLetterSink;
use classconnect::projector::{BatchOutcome, Projector, ProjectorConfig, ProjectorWorker};
use classconnect::query::QueryHandler;
use classconnect::relay::{ChangeRelay, RelayConfig};
use classconnect::storage::{MemoryEventLog, MemoryReadModel};

/// Every pipeline stage over in-memory stores, driven by hand.
pub struct Pipeline {
    pub log: Arc<MemoryEventLog>,
    pub read_model: Arc<MemoryReadModel>,
    pub dead_letters: Arc<MemoryDeadLetterSink>,
    pub queue: Arc<dyn RelayQueue>,
    pub commands: CommandHandler,
    pub queries: QueryHandler,
    pub relay: ChangeRelay,
    pub worker: ProjectorWorker,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_queue(Arc::new(ChannelQueue::default()), 10)
    }

    /// Pipeline over `queue`, projecting `batch_size` messages at a time.
    pub fn with_queue(queue: Arc<dyn RelayQueue>, batch_size: usize) -> Self {
        let log = Arc::new(MemoryEventLog::new());
        let read_model = Arc::new(MemoryReadModel::new());
        let dead_letters = Arc::new(MemoryDeadLetterSink::new());

        let commands = CommandHandler::new(
            log.clone(),
            CommandConfig {
                max_retries: 10,
                min_backoff_ms: 1,
                max_backoff_ms: 5,
            },
        );
        let queries = QueryHandler::new(read_model.clone(), log.clone());
        let relay = ChangeRelay::new(
            log.clone(),
            queue.clone(),
            RelayConfig {
                batch_size: 50,
                min_backoff_ms: 1,
                max_backoff_ms: 2,
                ..Default::default()
            },
        );
        let projector = Arc::new(Projector::new(
            read_model.clone(),
            dead_letters.clone(),
            ProjectorConfig {
                batch_size,
                wait_ms: 5,
                retry_delay_ms: 0,
                min_backoff_ms: 1,
                max_backoff_ms: 2,
                ..Default::default()
            },
        ));
        let worker = ProjectorWorker::new(projector, queue.clone());

        Self {
            log,
            read_model,
            dead_letters,
            queue,
            commands,
            queries,
            relay,
            worker,
        }
    }

    /// Relay everything committed, then project until the queue is quiet.
    pub async fn settle(&self) {
        self.relay.drain().await.expect("relay should drain");
        self.project_until_quiet().await;
    }

    /// Project batches until one comes back empty.
    pub async fn project_until_quiet(&self) {
        for _ in 0..1_000 {
            let outcome = self.worker.run_once().await.expect("receive should succeed");
            if outcome == BatchOutcome::default() {
                return;
            }
        }
        panic!("projector did not settle");
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}
