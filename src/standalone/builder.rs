//! Runtime builder for standalone mode.
//!
//! Provides a fluent API for configuring and building the standalone runtime.

use std::sync::Arc;

use crate::bus::{init_queue, ChaosConfig, MessagingConfig, QueueType, RelayQueue};
use crate::commands::CommandConfig;
use crate::config::ResourceNames;
use crate::dlq::{DeadLetterSink, LoggingDeadLetterSink};
use crate::projector::ProjectorConfig;
use crate::relay::RelayConfig;
use crate::storage::{init_storage, StorageConfig, StorageType};

use super::runtime::Runtime;
use super::RuntimeError;

/// Builder for creating a standalone runtime.
///
/// # Example
///
/// ```ignore
/// use classconnect::standalone::RuntimeBuilder;
///
/// let runtime = RuntimeBuilder::new()
///     .with_memory_storage()
///     .with_chaos(ChaosConfig { duplicate_rate: 0.2, shuffle: true })
///     .build()
///     .await?;
/// ```
pub struct RuntimeBuilder {
    /// Table and queue identifiers.
    resources: ResourceNames,
    /// Storage configuration.
    storage: StorageConfig,
    /// Messaging configuration.
    messaging: MessagingConfig,
    relay: RelayConfig,
    projector: ProjectorConfig,
    commands: CommandConfig,
    /// Optional custom relay queue (for testing or external transports).
    custom_queue: Option<Arc<dyn RelayQueue>>,
    /// Where flagged events go. Defaults to logging them.
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Create a new runtime builder with defaults for local development.
    ///
    /// Defaults:
    /// - Storage: in-memory
    /// - Messaging: in-process channel queue
    /// - Dead letters: logged
    pub fn new() -> Self {
        Self {
            resources: ResourceNames::default(),
            storage: StorageConfig {
                storage_type: StorageType::Memory,
                ..Default::default()
            },
            messaging: MessagingConfig {
                queue_type: QueueType::Channel,
                ..Default::default()
            },
            relay: RelayConfig::default(),
            projector: ProjectorConfig::default(),
            commands: CommandConfig::default(),
            custom_queue: None,
            dead_letters: None,
        }
    }

    // ========================================================================
    // Storage Configuration
    // ========================================================================

    /// Use in-memory storage (default).
    pub fn with_memory_storage(mut self) -> Self {
        self.storage.storage_type = StorageType::Memory;
        self
    }

    /// Use SQLite in-memory storage.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite_memory(mut self) -> Self {
        self.storage.storage_type = StorageType::Sqlite;
        self.storage.sqlite.path = None;
        self
    }

    /// Use SQLite file storage.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite_file(mut self, path: impl Into<String>) -> Self {
        self.storage.storage_type = StorageType::Sqlite;
        self.storage.sqlite.path = Some(path.into());
        self
    }

    /// Use custom storage configuration.
    pub fn with_storage(mut self, config: StorageConfig) -> Self {
        self.storage = config;
        self
    }

    /// Use custom table and queue identifiers.
    pub fn with_resources(mut self, resources: ResourceNames) -> Self {
        self.resources = resources;
        self
    }

    // ========================================================================
    // Messaging Configuration
    // ========================================================================

    /// Use custom messaging configuration.
    pub fn with_messaging(mut self, config: MessagingConfig) -> Self {
        self.messaging = config;
        self
    }

    /// Duplicate and reorder relayed messages (requires the `chaos` feature).
    pub fn with_chaos(mut self, chaos: ChaosConfig) -> Self {
        self.messaging.chaos = Some(chaos);
        self
    }

    /// Use a custom relay queue implementation.
    ///
    /// Overrides the messaging configuration entirely.
    pub fn with_queue(mut self, queue: Arc<dyn RelayQueue>) -> Self {
        self.custom_queue = Some(queue);
        self
    }

    // ========================================================================
    // Pipeline Configuration
    // ========================================================================

    pub fn with_relay_config(mut self, config: RelayConfig) -> Self {
        self.relay = config;
        self
    }

    pub fn with_projector_config(mut self, config: ProjectorConfig) -> Self {
        self.projector = config;
        self
    }

    pub fn with_command_config(mut self, config: CommandConfig) -> Self {
        self.commands = config;
        self
    }

    /// Send flagged events somewhere other than the log.
    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the runtime.
    ///
    /// Initializes storage (creating tables where needed) and the relay
    /// queue. Nothing runs until `Runtime::start`.
    pub async fn build(self) -> Result<Runtime, RuntimeError> {
        let storage = init_storage(&self.storage, &self.resources).await?;

        let queue = match self.custom_queue {
            Some(queue) => queue,
            None => init_queue(&self.messaging, &self.resources.relay_queue).await?,
        };

        let dead_letters = self
            .dead_letters
            .unwrap_or_else(|| Arc::new(LoggingDeadLetterSink));

        Ok(Runtime::new(
            storage,
            queue,
            dead_letters,
            self.relay,
            self.projector,
            self.commands,
        ))
    }

    // ========================================================================
    // Accessors (for testing/inspection)
    // ========================================================================

    /// Get the storage configuration.
    pub fn storage_config(&self) -> &StorageConfig {
        &self.storage
    }

    /// Get the messaging configuration.
    pub fn messaging_config(&self) -> &MessagingConfig {
        &self.messaging
    }

    /// Get the resource identifiers.
    pub fn resources(&self) -> &ResourceNames {
        &self.resources
    }
}
