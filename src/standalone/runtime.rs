//! Runtime implementation for standalone mode.
//!
//! Owns the stores, the relay queue and the pipeline stages, and runs the
//! relay and projector loops as background tasks.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bus::RelayQueue;
use crate::commands::{CommandConfig, CommandHandler};
use crate::config::Config;
use crate::dlq::DeadLetterSink;
use crate::projector::{Projector, ProjectorConfig, ProjectorWorker};
use crate::query::QueryHandler;
use crate::relay::{ChangeRelay, RelayConfig};
use crate::storage::Storage;

use super::builder::RuntimeBuilder;
use super::RuntimeError;

/// Standalone runtime.
///
/// Manages every pipeline component in one process:
/// - Storage (Event Log, change feed, read model)
/// - Relay queue
/// - Command and query handlers
/// - Change relay and projector worker loops
pub struct Runtime {
    storage: Storage,
    queue: Arc<dyn RelayQueue>,
    commands: Arc<CommandHandler>,
    queries: QueryHandler,
    relay: Arc<ChangeRelay>,
    worker: Arc<ProjectorWorker>,
}

impl Runtime {
    /// Create a new runtime (called by RuntimeBuilder).
    pub(crate) fn new(
        storage: Storage,
        queue: Arc<dyn RelayQueue>,
        dead_letters: Arc<dyn DeadLetterSink>,
        relay_config: RelayConfig,
        projector_config: ProjectorConfig,
        command_config: CommandConfig,
    ) -> Self {
        let commands = Arc::new(CommandHandler::new(
            storage.event_log.clone(),
            command_config,
        ));
        let queries = QueryHandler::new(storage.read_model.clone(), storage.event_log.clone());
        let relay = Arc::new(ChangeRelay::new(
            storage.changes.clone(),
            queue.clone(),
            relay_config,
        ));
        let projector = Arc::new(Projector::new(
            storage.read_model.clone(),
            dead_letters,
            projector_config,
        ));
        let worker = Arc::new(ProjectorWorker::new(projector, queue.clone()));

        info!("Runtime initialized");

        Self {
            storage,
            queue,
            commands,
            queries,
            relay,
            worker,
        }
    }

    /// Create a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Build a runtime from loaded configuration.
    ///
    /// Fails before touching any store when a resource identifier is missing.
    pub async fn from_config(config: &Config) -> Result<Self, RuntimeError> {
        let resources = config.resources()?;

        RuntimeBuilder::new()
            .with_resources(resources)
            .with_storage(config.storage.clone())
            .with_messaging(config.messaging.clone())
            .with_relay_config(config.relay.clone())
            .with_projector_config(config.projector.clone())
            .with_command_config(config.commands.clone())
            .build()
            .await
    }

    /// Command handler (write path).
    pub fn commands(&self) -> Arc<CommandHandler> {
        self.commands.clone()
    }

    /// Query handler (read path).
    pub fn queries(&self) -> QueryHandler {
        self.queries.clone()
    }

    /// Change relay, for driving passes by hand.
    pub fn relay(&self) -> Arc<ChangeRelay> {
        self.relay.clone()
    }

    /// Projector worker, for driving batches by hand.
    pub fn projector_worker(&self) -> Arc<ProjectorWorker> {
        self.worker.clone()
    }

    /// Relay queue shared by the relay and the projector.
    pub fn queue(&self) -> Arc<dyn RelayQueue> {
        self.queue.clone()
    }

    /// Underlying stores.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Start the relay and projector loops without blocking.
    pub fn start(&self) -> RuntimeHandle {
        let (shutdown, rx) = watch::channel(false);
        let tasks = vec![
            self.relay.clone().spawn(rx.clone()),
            self.worker.clone().spawn(rx),
        ];
        info!("Runtime started");
        RuntimeHandle { shutdown, tasks }
    }

    /// Run until Ctrl+C, then stop the background loops.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let handle = self.start();

        info!("Runtime running, press Ctrl+C to exit");
        tokio::signal::ctrl_c().await?;

        info!("Shutting down runtime");
        handle.stop().await;
        Ok(())
    }
}

/// Background tasks of a started runtime.
pub struct RuntimeHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RuntimeHandle {
    /// Signal shutdown and wait for the loops to finish their current pass.
    pub async fn stop(self) {
        // Receivers may already be gone if a task exited on its own.
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task panicked");
            }
        }
        info!("Runtime stopped");
    }
}
