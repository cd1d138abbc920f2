use serde_json::json;

use super::*;

fn record(version: u64, event: &RoomEvent) -> EventRecord {
    EventRecord::new("r1", version, event.to_data().unwrap())
}

#[test]
fn test_room_event_wire_format_matches_stored_data() {
    let created = RoomEvent::RoomCreated {
        name: "Algebra".to_string(),
        description: Some("intro".to_string()),
    };
    assert_eq!(
        serde_json::to_value(&created).unwrap(),
        json!({"type": "ROOM_CREATED", "name": "Algebra", "description": "intro"})
    );

    let scheduled = RoomEvent::SessionScheduled {
        schedule_id: "s1".to_string(),
        cron: "0 9 * * MON".to_string(),
        stop_after: Some("2025-01-01".to_string()),
    };
    assert_eq!(
        serde_json::to_value(&scheduled).unwrap(),
        json!({"type": "SESSION_SCHEDULED", "id": "s1", "cron": "0 9 * * MON", "stopAfter": "2025-01-01"})
    );

    assert_eq!(
        serde_json::to_value(&RoomEvent::RoomDeleted).unwrap(),
        json!({"type": "ROOM_DELETED"})
    );
}

#[test]
fn test_room_created_without_description_omits_field() {
    let created = RoomEvent::RoomCreated {
        name: "Algebra".to_string(),
        description: None,
    };
    assert_eq!(
        created.to_data().unwrap(),
        r#"{"type":"ROOM_CREATED","name":"Algebra"}"#
    );
}

#[test]
fn test_unrecognised_type_decodes_as_unknown() {
    let event = RoomEvent::from_value(json!({"type": "ROOM_ARCHIVED", "reason": "old"})).unwrap();
    assert_eq!(event, RoomEvent::Unknown);
    assert_eq!(event.kind(), "UNKNOWN");
}

#[test]
fn test_missing_fields_fail_to_decode() {
    assert!(RoomEvent::from_value(json!({"type": "ROOM_RENAMED"})).is_err());
    assert!(RoomEvent::from_value(json!({"name": "no tag"})).is_err());
    assert!(RoomEvent::from_value(json!("not an object")).is_err());
}

#[test]
fn test_apply_sets_version_and_state() {
    let mut room = Room::empty("r1");
    room.apply(
        1,
        &RoomEvent::RoomCreated {
            name: "Algebra".to_string(),
            description: Some("intro".to_string()),
        },
    );
    room.apply(
        2,
        &RoomEvent::RoomRenamed {
            name: "Algebra II".to_string(),
        },
    );

    assert_eq!(room.version, 2);
    assert_eq!(room.name.as_deref(), Some("Algebra II"));
    assert_eq!(room.description.as_deref(), Some("intro"));
    assert!(!room.deleted);
    assert!(room.invitees.is_empty());
    assert!(room.schedules.is_empty());
}

#[test]
fn test_invitees_union_deduplicates_by_type_and_id() {
    let mut room = Room::empty("r1");
    room.apply(
        1,
        &RoomEvent::EntityInvited {
            invitees: vec![Invitee::new("user", "u1"), Invitee::new("user", "u1")],
        },
    );
    room.apply(
        2,
        &RoomEvent::EntityInvited {
            invitees: vec![Invitee::new("group", "u1"), Invitee::new("user", "u1")],
        },
    );

    assert_eq!(
        room.invitees,
        vec![Invitee::new("user", "u1"), Invitee::new("group", "u1")]
    );
}

#[test]
fn test_session_scheduled_appends_schedule() {
    let mut room = Room::empty("r1");
    for (version, id) in [(1, "s1"), (2, "s2")] {
        room.apply(
            version,
            &RoomEvent::SessionScheduled {
                schedule_id: id.to_string(),
                cron: "* * * * *".to_string(),
                stop_after: None,
            },
        );
    }
    let ids: Vec<_> = room.schedules.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2"]);
}

#[test]
fn test_deleted_sets_tombstone_and_unknown_only_advances() {
    let mut room = Room::empty("r1");
    room.apply(1, &RoomEvent::RoomDeleted);
    room.apply(2, &RoomEvent::Unknown);

    assert!(room.deleted);
    assert_eq!(room.version, 2);
    assert!(room.name.is_none());
}

#[test]
fn test_replay_folds_records_in_order() {
    let records = vec![
        record(
            1,
            &RoomEvent::RoomCreated {
                name: "Algebra".to_string(),
                description: None,
            },
        ),
        EventRecord::new("r1", 2, "{not json"),
        record(3, &RoomEvent::RoomDeleted),
    ];

    let room = Room::replay("r1", &records).unwrap();
    assert_eq!(room.version, 3);
    assert_eq!(room.name.as_deref(), Some("Algebra"));
    assert!(room.deleted);

    assert!(Room::replay("r1", &[]).is_none());
}

#[test]
fn test_room_serializes_camel_case() {
    let mut room = Room::empty("r1");
    room.schedules.push(Schedule {
        id: "s1".to_string(),
        cron: "* * * * *".to_string(),
        stop_after: Some("never".to_string()),
    });
    let value = serde_json::to_value(&room).unwrap();
    assert_eq!(value["schedules"][0]["stopAfter"], "never");
    assert_eq!(value["deleted"], false);

    let back: Room = serde_json::from_value(value).unwrap();
    assert_eq!(back, room);
}
