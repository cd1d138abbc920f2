//! ReadModelStore interface tests.

use uuid::Uuid;

use classconnect::domain::{Invitee, Room, Schedule};
use classconnect::storage::{ReadModelStore, StorageError};

fn room_at(id: &str, version: u64) -> Room {
    let mut room = Room::empty(id);
    room.version = version;
    room.name = Some(format!("room v{version}"));
    room
}

pub async fn test_get_missing<S: ReadModelStore>(store: &S) {
    assert!(store.get(&Uuid::new_v4().to_string()).await.unwrap().is_none());
}

pub async fn test_save_then_get_round_trips_state<S: ReadModelStore>(store: &S) {
    let id = Uuid::new_v4().to_string();
    let mut room = room_at(&id, 3);
    room.description = Some("Tuesdays".to_string());
    room.invitees.push(Invitee::new("User", "u1"));
    room.schedules.push(Schedule {
        id: "s1".to_string(),
        cron: "0 9 * * 1".to_string(),
        stop_after: None,
    });

    store.save(&room, 0).await.expect("first save should succeed");

    assert_eq!(store.get(&id).await.unwrap(), Some(room));
}

pub async fn test_save_conditional_on_prior_version<S: ReadModelStore>(store: &S) {
    let id = Uuid::new_v4().to_string();
    store.save(&room_at(&id, 2), 0).await.unwrap();
    store.save(&room_at(&id, 4), 2).await.unwrap();

    // A writer that loaded version 2 must not overwrite version 4.
    let stale = store.save(&room_at(&id, 3), 2).await;

    assert!(matches!(stale, Err(StorageError::Conflict { .. })));
    assert_eq!(store.get(&id).await.unwrap().unwrap().version, 4);
}

pub async fn test_first_save_conflicts_when_record_exists<S: ReadModelStore>(store: &S) {
    let id = Uuid::new_v4().to_string();
    store.save(&room_at(&id, 1), 0).await.unwrap();

    let result = store.save(&room_at(&id, 1), 0).await;

    assert!(matches!(result, Err(StorageError::Conflict { .. })));
}

pub async fn test_list_includes_saved_and_filters_type<S: ReadModelStore>(store: &S) {
    let id = Uuid::new_v4().to_string();
    let mut room = room_at(&id, 1);
    room.deleted = true;
    store.save(&room, 0).await.unwrap();

    // Tombstones are the query handler's concern; the store lists them.
    let all = store.list(None).await.unwrap();
    assert!(all.iter().any(|r| r.id == id && r.deleted));
    let rooms = store.list(Some("Room")).await.unwrap();
    assert!(rooms.iter().any(|r| r.id == id));
    let other = store.list(Some("Course")).await.unwrap();
    assert!(other.iter().all(|r| r.id != id));
}

#[macro_export]
macro_rules! run_read_model_tests {
    ($store:expr) => {
        use $crate::storage::read_model_tests::*;

        test_get_missing($store).await;
        println!("  test_get_missing: PASSED");

        test_save_then_get_round_trips_state($store).await;
        println!("  test_save_then_get_round_trips_state: PASSED");

        test_save_conditional_on_prior_version($store).await;
        println!("  test_save_conditional_on_prior_version: PASSED");

        test_first_save_conflicts_when_record_exists($store).await;
        println!("  test_first_save_conflicts_when_record_exists: PASSED");

        test_list_includes_saved_and_filters_type($store).await;
        println!("  test_list_includes_saved_and_filters_type: PASSED");
    };
}
