//! In-memory EventLog and ChangeFeed.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{EventRecord, RoomEvent};
use crate::storage::{ChangeFeed, ChangeNotification, ChangeRecord, EventLog, Result, StorageError};

#[derive(Default)]
struct LogState {
    versions: HashMap<String, u64>,
    events: HashMap<String, Vec<EventRecord>>,
    stream: BTreeMap<u64, ChangeRecord>,
    next_sequence: u64,
}

impl LogState {
    fn push_change(&mut self, change: ChangeRecord) {
        self.next_sequence += 1;
        self.stream.insert(self.next_sequence, change);
    }
}

/// Event log held in memory.
///
/// The version record, event list and change stream live behind one lock,
/// so every append is a single atomic step.
#[derive(Default)]
pub struct MemoryEventLog {
    state: RwLock<LogState>,
    fail_on_append: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `try_append` fail with a transient error.
    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    /// Make `load_version` and `read_events` fail with a transient error.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Write an Event Record with arbitrary payload, advancing the version
    /// record without the usual encoding. Lets tests seed malformed events.
    pub async fn append_raw(&self, aggregate_id: &str, data: &str) -> u64 {
        let mut state = self.state.write().await;
        let version = state.versions.get(aggregate_id).copied().unwrap_or(0) + 1;
        state.versions.insert(aggregate_id.to_string(), version);
        let record = EventRecord::new(aggregate_id, version, data);
        state
            .events
            .entry(aggregate_id.to_string())
            .or_default()
            .push(record.clone());
        state.push_change(ChangeRecord::AggregateVersion {
            aggregate_id: aggregate_id.to_string(),
            version,
        });
        state.push_change(ChangeRecord::Event(record));
        version
    }

    /// Number of change notifications not yet acknowledged.
    pub async fn pending_changes(&self) -> usize {
        self.state.read().await.stream.len()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn load_version(&self, aggregate_id: &str) -> Result<Option<u64>> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Transient("injected read failure".to_string()));
        }
        Ok(self.state.read().await.versions.get(aggregate_id).copied())
    }

    async fn try_append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        event: &RoomEvent,
    ) -> Result<u64> {
        if *self.fail_on_append.read().await {
            return Err(StorageError::Transient("injected append failure".to_string()));
        }
        let data = event.to_data()?;

        let mut state = self.state.write().await;
        let stored = state.versions.get(aggregate_id).copied().unwrap_or(0);
        if stored != expected_version {
            return Err(StorageError::Conflict {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
            });
        }

        let version = expected_version + 1;
        let record = EventRecord::new(aggregate_id, version, data);
        state.versions.insert(aggregate_id.to_string(), version);
        state
            .events
            .entry(aggregate_id.to_string())
            .or_default()
            .push(record.clone());
        state.push_change(ChangeRecord::AggregateVersion {
            aggregate_id: aggregate_id.to_string(),
            version,
        });
        state.push_change(ChangeRecord::Event(record));

        Ok(version)
    }

    async fn read_events(&self, aggregate_id: &str) -> Result<Vec<EventRecord>> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Transient("injected read failure".to_string()));
        }
        Ok(self
            .state
            .read()
            .await
            .events
            .get(aggregate_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ChangeFeed for MemoryEventLog {
    async fn poll(&self, limit: usize) -> Result<Vec<ChangeNotification>> {
        let state = self.state.read().await;
        Ok(state
            .stream
            .iter()
            .take(limit)
            .map(|(sequence, change)| ChangeNotification {
                sequence: *sequence,
                change: change.clone(),
            })
            .collect())
    }

    async fn ack(&self, sequence: u64) -> Result<()> {
        self.state.write().await.stream.remove(&sequence);
        Ok(())
    }
}
