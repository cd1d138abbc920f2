//! Query handler: the read path.
//!
//! Serves projected rooms from the read model. Tombstoned rooms are treated
//! as not found. The Event Log is exposed read-only for audit.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{EventRecord, Room};
use crate::storage::{EventLog, ReadModelStore, Result};

/// Reads rooms from the read model and raw events from the Event Log.
#[derive(Clone)]
pub struct QueryHandler {
    read_model: Arc<dyn ReadModelStore>,
    log: Arc<dyn EventLog>,
}

impl QueryHandler {
    pub fn new(read_model: Arc<dyn ReadModelStore>, log: Arc<dyn EventLog>) -> Self {
        Self { read_model, log }
    }

    /// Projected room, or `None` if it was never projected or is deleted.
    pub async fn room_by_id(&self, id: &str) -> Result<Option<Room>> {
        let room = self.read_model.get(id).await?;
        Ok(room.filter(|r| !r.deleted))
    }

    /// All live projected rooms, optionally restricted to one aggregate type.
    pub async fn rooms(&self, aggregate_type: Option<&str>) -> Result<Vec<Room>> {
        let rooms: Vec<Room> = self
            .read_model
            .list(aggregate_type)
            .await?
            .into_iter()
            .filter(|r| !r.deleted)
            .collect();
        debug!(count = rooms.len(), "Listed rooms");
        Ok(rooms)
    }

    /// Raw Event Records of an aggregate, ascending by version.
    pub async fn events(&self, id: &str) -> Result<Vec<EventRecord>> {
        self.log.read_events(id).await
    }

    /// Fold the Event Log directly, bypassing the read model.
    ///
    /// Reflects every committed event immediately. Deleted rooms are still
    /// returned with their tombstone set.
    pub async fn replay_room(&self, id: &str) -> Result<Option<Room>> {
        let records = self.log.read_events(id).await?;
        Ok(Room::replay(id, &records))
    }
}
