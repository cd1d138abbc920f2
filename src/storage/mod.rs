//! Event Log and Read Model storage.
//!
//! This module contains:
//! - `EventLog` trait: versioned append with optimistic concurrency
//! - `ChangeFeed` trait: commit-ordered notifications of Event Log writes
//! - `ReadModelStore` trait: one projected record per aggregate
//! - Storage configuration types
//! - Implementations: in-memory, SQLite

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::ResourceNames;
use crate::domain::{EventRecord, Room, RoomEvent};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{MemoryEventLog, MemoryReadModel};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteEventLog, SqliteReadModel};

// ============================================================================
// Errors
// ============================================================================

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Version conflict on aggregate {aggregate_id}: expected version {expected}")]
    Conflict { aggregate_id: String, expected: u64 },

    #[error("Aggregate not found: {0}")]
    AggregateNotFound(String),

    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage backend not available: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether retrying the same call may succeed (throttling, lock contention, I/O).
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Transient(_) => true,
            #[cfg(feature = "sqlite")]
            StorageError::Database(e) => is_transient_sqlx(e),
            _ => false,
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6) clear once the competing writer commits.
#[cfg(feature = "sqlite")]
fn is_transient_sqlx(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("5") | Some("6")),
        _ => false,
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A write observed on the Event Log, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    /// The Aggregate Version Record was created or advanced.
    AggregateVersion { aggregate_id: String, version: u64 },
    /// An Event Record was written.
    Event(EventRecord),
}

/// A change-feed entry. `sequence` is the feed position used to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub sequence: u64,
    pub change: ChangeRecord,
}

/// Interface for the append-only Event Log.
///
/// The Aggregate Version Record is the single source of truth for the next
/// version: it starts absent (version 0) and advances by exactly one per
/// committed event.
///
/// Implementations:
/// - `MemoryEventLog`: In-memory, for tests and single-process runs
/// - `SqliteEventLog`: SQLite storage
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Stored version of an aggregate, or `None` if it has no version record.
    async fn load_version(&self, aggregate_id: &str) -> Result<Option<u64>>;

    /// Current version, 0 for an aggregate that does not exist yet.
    async fn current_version(&self, aggregate_id: &str) -> Result<u64> {
        Ok(self.load_version(aggregate_id).await?.unwrap_or(0))
    }

    /// Atomically append `event` at `expected_version + 1`.
    ///
    /// Succeeds only if the stored version equals `expected_version`; the
    /// Event Record write and the version advance happen together or not at
    /// all. Returns the committed version, or `StorageError::Conflict`.
    async fn try_append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        event: &RoomEvent,
    ) -> Result<u64>;

    /// All Event Records of an aggregate, ascending by version.
    async fn read_events(&self, aggregate_id: &str) -> Result<Vec<EventRecord>>;
}

/// Commit-ordered notifications of Event Log writes.
///
/// A notification stays in the feed until acknowledged; `poll` returns the
/// oldest unacknowledged ones first.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn poll(&self, limit: usize) -> Result<Vec<ChangeNotification>>;

    async fn ack(&self, sequence: u64) -> Result<()>;
}

/// Interface for the materialized read model.
///
/// Implementations:
/// - `MemoryReadModel`: In-memory
/// - `SqliteReadModel`: SQLite storage
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Projected record for an aggregate, including tombstoned ones.
    async fn get(&self, id: &str) -> Result<Option<Room>>;

    /// All projected records, optionally restricted to one aggregate type.
    async fn list(&self, aggregate_type: Option<&str>) -> Result<Vec<Room>>;

    /// Write `room` if the stored record is still at `expected_version`
    /// (0 meaning "no record yet"), otherwise `StorageError::Conflict`.
    async fn save(&self, room: &Room, expected_version: u64) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-memory storage (lost on exit).
    Memory,
    /// SQLite storage.
    #[default]
    Sqlite,
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path. `None` uses an in-memory database.
    pub path: Option<String>,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
}

/// Handles to every store the pipeline writes or reads.
#[derive(Clone)]
pub struct Storage {
    pub event_log: Arc<dyn EventLog>,
    pub changes: Arc<dyn ChangeFeed>,
    pub read_model: Arc<dyn ReadModelStore>,
}

impl Storage {
    /// Fresh in-memory stores.
    pub fn memory() -> Self {
        let log = Arc::new(MemoryEventLog::new());
        Self {
            event_log: log.clone(),
            changes: log,
            read_model: Arc::new(MemoryReadModel::new()),
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig, names: &ResourceNames) -> Result<Storage> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: in-memory");
            Ok(Storage::memory())
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let pool = sqlite::connect(config.sqlite.path.as_deref()).await?;
            info!(
                path = config.sqlite.path.as_deref().unwrap_or(":memory:"),
                aggregates = %names.aggregates_table,
                events = %names.events_table,
                read_model = %names.read_model_table,
                "Storage: sqlite"
            );

            let log = Arc::new(SqliteEventLog::new(pool.clone(), names));
            log.init().await?;
            let read_model = Arc::new(SqliteReadModel::new(pool, &names.read_model_table));
            read_model.init().await?;

            Ok(Storage {
                event_log: log.clone(),
                changes: log,
                read_model,
            })
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            let _ = names;
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::Unavailable("sqlite feature not enabled".to_string()))
        }
    }
}
