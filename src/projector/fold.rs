//! Per-aggregate grouping and the version-gated fold.
//!
//! A delivered batch may mix aggregates, repeat messages and arrive out of
//! order. Grouping gives each aggregate an ordered list of pending events;
//! folding applies only the event that is exactly next for the current
//! read model, so redelivery and reordering converge on the same state.

use std::collections::BTreeMap;

use crate::bus::Delivery;
use crate::domain::{Room, RoomEvent};

/// One relayed event awaiting fold.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub receipt: String,
    pub aggregate_id: String,
    pub version: u64,
    /// Decoded event, or why the payload did not decode.
    pub event: Result<RoomEvent, String>,
    /// Raw message body, kept for dead letters.
    pub body: String,
    pub receive_count: u32,
}

/// A delivery that names no aggregate and version.
#[derive(Debug, Clone, PartialEq)]
pub struct Undecodable {
    pub delivery: Delivery,
    pub error: String,
}

/// A batch split by aggregate id.
#[derive(Debug, Default)]
pub struct Grouped {
    /// Pending events per aggregate, in the order seen in the batch.
    pub by_aggregate: BTreeMap<String, Vec<Pending>>,
    pub undecodable: Vec<Undecodable>,
}

/// Group a delivered batch by aggregate id, preserving batch order per group.
pub fn group_by_aggregate(deliveries: Vec<Delivery>) -> Grouped {
    let mut grouped = Grouped::default();

    for delivery in deliveries {
        let header = match delivery.decode_header() {
            Ok(header) => header,
            Err(e) => {
                grouped.undecodable.push(Undecodable {
                    error: e.to_string(),
                    delivery,
                });
                continue;
            }
        };

        // Once the version is known, any further decode failure consumes it.
        let event = delivery
            .decode()
            .and_then(|message| RoomEvent::from_value(message.event_data))
            .map_err(|e| e.to_string());
        grouped
            .by_aggregate
            .entry(header.aggregate_id.clone())
            .or_default()
            .push(Pending {
                receipt: delivery.receipt,
                aggregate_id: header.aggregate_id,
                version: header.version,
                event,
                body: delivery.body,
                receive_count: delivery.receive_count,
            });
    }

    grouped
}

/// Result of folding one aggregate's pending events.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldOutcome {
    pub room: Room,
    /// Folded onto the room.
    pub applied: Vec<Pending>,
    /// At or below the room's version before they were reached.
    pub duplicates: Vec<Pending>,
    /// Beyond the next version; an earlier event has not been seen yet.
    pub deferred: Vec<Pending>,
    /// Next in line but undecodable; the version was consumed as a no-op.
    pub flagged: Vec<Pending>,
}

impl FoldOutcome {
    /// Whether the room changed and must be persisted.
    pub fn advanced(&self) -> bool {
        !self.applied.is_empty() || !self.flagged.is_empty()
    }
}

/// Fold pending events onto `room` in version order.
///
/// For the room at version `v`, an event at `v + 1` is applied, one at or
/// below `v` is a duplicate, and one beyond `v + 1` is deferred.
pub fn fold_pending(mut room: Room, mut pending: Vec<Pending>) -> FoldOutcome {
    pending.sort_by_key(|p| p.version);

    let mut applied = Vec::new();
    let mut duplicates = Vec::new();
    let mut deferred = Vec::new();
    let mut flagged = Vec::new();

    for p in pending {
        if p.version <= room.version {
            duplicates.push(p);
        } else if room.is_next(p.version) {
            match &p.event {
                Ok(event) => {
                    room.apply(p.version, event);
                    applied.push(p);
                }
                Err(_) => {
                    room.skip(p.version);
                    flagged.push(p);
                }
            }
        } else {
            deferred.push(p);
        }
    }

    FoldOutcome {
        room,
        applied,
        duplicates,
        deferred,
        flagged,
    }
}
