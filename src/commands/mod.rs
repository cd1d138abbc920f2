//! Command handler: the write path.
//!
//! Each command reads the aggregate's current version, builds one event and
//! appends it with a compare-and-set on that version. A lost race surfaces
//! as a conflict and the command retries from the version read, up to a
//! bounded number of attempts.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Invitee, RoomEvent};
use crate::storage::{EventLog, StorageError};
use crate::utils::retry::command_backoff;

/// Errors surfaced to command callers.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Concurrent modification of aggregate {aggregate_id}, retries exhausted")]
    Conflict { aggregate_id: String },

    #[error("Aggregate not found: {0}")]
    AggregateNotFound(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Store error: {0}")]
    Store(StorageError),
}

impl CommandError {
    /// Conflicts and transient store failures may succeed on a fresh attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommandError::Conflict { .. } => true,
            CommandError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<StorageError> for CommandError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict { aggregate_id, .. } => CommandError::Conflict { aggregate_id },
            StorageError::AggregateNotFound(id) => CommandError::AggregateNotFound(id),
            other => CommandError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Command handler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Retries after a conflict or transient store error.
    pub max_retries: usize,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_backoff_ms: 5,
            max_backoff_ms: 200,
        }
    }
}

/// Which version record state an append requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// No version record yet; append at version 1.
    New,
    /// Version record must exist; append after its current version.
    Existing,
}

/// Handles room commands against the Event Log.
///
/// Holds no mutable state; concurrent commands on one aggregate are
/// serialized only by the Event Log's conditional append.
pub struct CommandHandler {
    log: Arc<dyn EventLog>,
    config: CommandConfig,
}

impl CommandHandler {
    pub fn new(log: Arc<dyn EventLog>, config: CommandConfig) -> Self {
        Self { log, config }
    }

    /// Create a room under a fresh id and return the id.
    #[tracing::instrument(skip(self, description))]
    pub async fn create_room(&self, name: &str, description: Option<&str>) -> Result<String> {
        let name = required("name", name)?;
        let id = Uuid::new_v4().to_string();
        let event = RoomEvent::RoomCreated {
            name,
            description: description.map(str::to_string),
        };
        self.append(&id, &event, Target::New).await?;
        info!(aggregate_id = %id, "Room created");
        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    pub async fn rename_room(&self, id: &str, name: &str) -> Result<()> {
        let name = required("name", name)?;
        self.append(id, &RoomEvent::RoomRenamed { name }, Target::Existing)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_room(&self, id: &str) -> Result<()> {
        self.append(id, &RoomEvent::RoomDeleted, Target::Existing)
            .await?;
        Ok(())
    }

    /// Schedule a session on a room and return the new schedule id.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_session(
        &self,
        room_id: &str,
        cron: &str,
        stop_after: Option<&str>,
    ) -> Result<String> {
        let cron = required("cron", cron)?;
        let schedule_id = Uuid::new_v4().to_string();
        let event = RoomEvent::SessionScheduled {
            schedule_id: schedule_id.clone(),
            cron,
            stop_after: stop_after.map(str::to_string),
        };
        self.append(room_id, &event, Target::Existing).await?;
        Ok(schedule_id)
    }

    #[tracing::instrument(skip(self, invitees), fields(invitees = invitees.len()))]
    pub async fn invite(&self, id: &str, invitees: Vec<Invitee>) -> Result<()> {
        self.append(id, &RoomEvent::EntityInvited { invitees }, Target::Existing)
            .await?;
        Ok(())
    }

    /// Read the version, append, and on conflict start over from the read.
    ///
    /// A new aggregate always expects version 0, so a conflict there is
    /// final rather than retried into someone else's aggregate.
    async fn append(&self, aggregate_id: &str, event: &RoomEvent, target: Target) -> Result<u64> {
        let version = (|| async {
            let expected = match target {
                Target::New => 0,
                Target::Existing => self
                    .log
                    .load_version(aggregate_id)
                    .await?
                    .ok_or_else(|| CommandError::AggregateNotFound(aggregate_id.to_string()))?,
            };
            Ok::<_, CommandError>(self.log.try_append(aggregate_id, expected, event).await?)
        })
        .retry(command_backoff(&self.config))
        .when(|e: &CommandError| {
            e.is_retryable() && !(target == Target::New && matches!(e, CommandError::Conflict { .. }))
        })
        .notify(|err: &CommandError, dur: Duration| {
            warn!(aggregate_id, error = %err, delay = ?dur, "Append failed, retrying");
        })
        .await?;

        debug!(aggregate_id, version, kind = event.kind(), "Event committed");
        Ok(version)
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CommandError::InvalidCommand(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests;
