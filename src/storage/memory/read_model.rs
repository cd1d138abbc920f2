//! In-memory ReadModelStore.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Room, ROOM_AGGREGATE_TYPE};
use crate::storage::{ReadModelStore, Result, StorageError};

/// Read model held in memory, keyed by aggregate id.
#[derive(Default)]
pub struct MemoryReadModel {
    rooms: RwLock<BTreeMap<String, Room>>,
    fail_on_save: RwLock<u32>,
    fail_for: RwLock<BTreeMap<String, u32>>,
}

impl MemoryReadModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` saves with a transient error.
    pub async fn fail_next_saves(&self, count: u32) {
        *self.fail_on_save.write().await = count;
    }

    /// Fail the next `count` saves of one aggregate with a transient error.
    pub async fn fail_saves_for(&self, id: &str, count: u32) {
        self.fail_for.write().await.insert(id.to_string(), count);
    }
}

#[async_trait]
impl ReadModelStore for MemoryReadModel {
    async fn get(&self, id: &str) -> Result<Option<Room>> {
        Ok(self.rooms.read().await.get(id).cloned())
    }

    async fn list(&self, aggregate_type: Option<&str>) -> Result<Vec<Room>> {
        // Every record held here is a room.
        if aggregate_type.is_some_and(|t| t != ROOM_AGGREGATE_TYPE) {
            return Ok(Vec::new());
        }
        Ok(self.rooms.read().await.values().cloned().collect())
    }

    async fn save(&self, room: &Room, expected_version: u64) -> Result<()> {
        {
            let mut remaining = self.fail_on_save.write().await;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::Transient("injected save failure".to_string()));
            }
        }
        if let Some(remaining) = self.fail_for.write().await.get_mut(&room.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::Transient(format!(
                    "injected save failure for {}",
                    room.id
                )));
            }
        }

        let mut rooms = self.rooms.write().await;
        let stored = rooms.get(&room.id).map(|r| r.version).unwrap_or(0);
        if stored != expected_version {
            return Err(StorageError::Conflict {
                aggregate_id: room.id.clone(),
                expected: expected_version,
            });
        }
        rooms.insert(room.id.clone(), room.clone());
        Ok(())
    }
}
