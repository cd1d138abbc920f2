//! Room domain events and the persisted Event Record.

use serde::{Deserialize, Serialize};

/// Aggregate type recorded on every room aggregate.
pub const ROOM_AGGREGATE_TYPE: &str = "Room";

/// An entity invited to a room, unique by `(type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invitee {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl Invitee {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Domain events of the room aggregate.
///
/// Serialized internally tagged on `"type"`. Tags this build does not know
/// decode to [`RoomEvent::Unknown`] instead of failing, so older readers can
/// fold newer logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEvent {
    RoomCreated {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    RoomRenamed {
        name: String,
    },
    RoomDeleted,
    SessionScheduled {
        #[serde(rename = "id")]
        schedule_id: String,
        cron: String,
        #[serde(rename = "stopAfter", default, skip_serializing_if = "Option::is_none")]
        stop_after: Option<String>,
    },
    EntityInvited {
        invitees: Vec<Invitee>,
    },
    #[serde(other)]
    Unknown,
}

impl RoomEvent {
    /// Wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            RoomEvent::RoomCreated { .. } => "ROOM_CREATED",
            RoomEvent::RoomRenamed { .. } => "ROOM_RENAMED",
            RoomEvent::RoomDeleted => "ROOM_DELETED",
            RoomEvent::SessionScheduled { .. } => "SESSION_SCHEDULED",
            RoomEvent::EntityInvited { .. } => "ENTITY_INVITED",
            RoomEvent::Unknown => "UNKNOWN",
        }
    }

    /// Serialize to the JSON string stored in the `data` attribute.
    pub fn to_data(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from a JSON value (relay payloads arrive already parsed).
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// One immutable entry of the Event Log, unique by `(aggregate_id, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub aggregate_id: String,
    pub version: u64,
    /// Serialized [`RoomEvent`].
    pub data: String,
}

impl EventRecord {
    pub fn new(aggregate_id: impl Into<String>, version: u64, data: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            version,
            data: data.into(),
        }
    }

    /// Decode the stored payload.
    pub fn event(&self) -> Result<RoomEvent, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}
