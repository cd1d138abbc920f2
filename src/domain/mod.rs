//! Room aggregate: events, Event Records, and the projected read model.

mod event;
mod room;

pub use event::{EventRecord, Invitee, RoomEvent, ROOM_AGGREGATE_TYPE};
pub use room::{Room, Schedule};

#[cfg(test)]
mod tests;
