//! Room read model and its fold over [`RoomEvent`]s.

use serde::{Deserialize, Serialize};

use super::event::{EventRecord, Invitee, RoomEvent};

/// A scheduled session of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub cron: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_after: Option<String>,
}

/// Projected current state of one room aggregate.
///
/// Derived entirely by folding the aggregate's events in version order,
/// starting from [`Room::empty`]. `version` is the last folded version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub invitees: Vec<Invitee>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

impl Room {
    /// Canonical empty aggregate: version 0, no name, nothing invited or scheduled.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            name: None,
            description: None,
            deleted: false,
            invitees: Vec::new(),
            schedules: Vec::new(),
        }
    }

    /// True when `version` is the next one this room can fold.
    pub fn is_next(&self, version: u64) -> bool {
        version == self.version + 1
    }

    /// Fold one event, moving the room to `version`.
    pub fn apply(&mut self, version: u64, event: &RoomEvent) {
        match event {
            RoomEvent::RoomCreated { name, description } => {
                self.name = Some(name.clone());
                self.description = description.clone();
            }
            RoomEvent::RoomRenamed { name } => {
                self.name = Some(name.clone());
            }
            RoomEvent::RoomDeleted => {
                self.deleted = true;
            }
            RoomEvent::SessionScheduled {
                schedule_id,
                cron,
                stop_after,
            } => {
                self.schedules.push(Schedule {
                    id: schedule_id.clone(),
                    cron: cron.clone(),
                    stop_after: stop_after.clone(),
                });
            }
            RoomEvent::EntityInvited { invitees } => {
                for invitee in invitees {
                    if !self.invitees.contains(invitee) {
                        self.invitees.push(invitee.clone());
                    }
                }
            }
            RoomEvent::Unknown => {}
        }
        self.version = version;
    }

    /// Consume `version` without changing state.
    pub fn skip(&mut self, version: u64) {
        self.version = version;
    }

    /// Left-fold an ordered event sequence over the empty room.
    ///
    /// Returns `None` for an empty sequence. Records whose payload does not
    /// decode are skipped the same way the projector skips them.
    pub fn replay(id: &str, records: &[EventRecord]) -> Option<Room> {
        if records.is_empty() {
            return None;
        }
        let mut room = Room::empty(id);
        for record in records {
            match record.event() {
                Ok(event) => room.apply(record.version, &event),
                Err(_) => room.skip(record.version),
            }
        }
        Some(room)
    }
}
