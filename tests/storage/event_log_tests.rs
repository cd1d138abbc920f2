//! EventLog and ChangeFeed interface tests.
//!
//! These tests verify the contract of the EventLog and ChangeFeed traits.
//! Each storage implementation should run these tests.

use std::sync::Arc;

use uuid::Uuid;

use classconnect::domain::RoomEvent;
use classconnect::storage::{ChangeFeed, ChangeRecord, EventLog, StorageError};

pub fn created(name: &str) -> RoomEvent {
    RoomEvent::RoomCreated {
        name: name.to_string(),
        description: None,
    }
}

pub fn renamed(name: &str) -> RoomEvent {
    RoomEvent::RoomRenamed {
        name: name.to_string(),
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Acknowledge everything currently in the feed.
async fn drain_feed<S: ChangeFeed>(store: &S) {
    loop {
        let batch = store.poll(100).await.expect("poll should succeed");
        if batch.is_empty() {
            return;
        }
        for n in batch {
            store.ack(n.sequence).await.expect("ack should succeed");
        }
    }
}

// =============================================================================
// EventLog tests
// =============================================================================

pub async fn test_unknown_aggregate_has_no_version<S: EventLog>(store: &S) {
    let id = new_id();

    assert_eq!(store.load_version(&id).await.unwrap(), None);
    assert_eq!(store.current_version(&id).await.unwrap(), 0);
    assert!(store.read_events(&id).await.unwrap().is_empty());
}

pub async fn test_append_from_zero<S: EventLog>(store: &S) {
    let id = new_id();

    let version = store
        .try_append(&id, 0, &created("Algebra"))
        .await
        .expect("first append should succeed");

    assert_eq!(version, 1);
    assert_eq!(store.load_version(&id).await.unwrap(), Some(1));
    let events = store.read_events(&id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].version, 1);
    assert_eq!(events[0].aggregate_id, id);
    assert_eq!(events[0].event().unwrap(), created("Algebra"));
}

pub async fn test_sequential_appends_are_dense<S: EventLog>(store: &S) {
    let id = new_id();

    store.try_append(&id, 0, &created("a")).await.unwrap();
    for v in 1..5 {
        let next = store
            .try_append(&id, v, &renamed(&format!("n{v}")))
            .await
            .unwrap();
        assert_eq!(next, v + 1);
    }

    let versions: Vec<u64> = store
        .read_events(&id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

pub async fn test_stale_expected_version_conflicts<S: EventLog>(store: &S) {
    let id = new_id();
    store.try_append(&id, 0, &created("a")).await.unwrap();
    store.try_append(&id, 1, &renamed("b")).await.unwrap();

    let result = store.try_append(&id, 1, &renamed("stale")).await;

    assert!(
        matches!(result, Err(StorageError::Conflict { expected: 1, .. })),
        "stale append should conflict, got {result:?}"
    );
    assert_eq!(store.load_version(&id).await.unwrap(), Some(2));
    assert_eq!(store.read_events(&id).await.unwrap().len(), 2);
}

pub async fn test_create_twice_conflicts<S: EventLog>(store: &S) {
    let id = new_id();
    store.try_append(&id, 0, &created("a")).await.unwrap();

    let result = store.try_append(&id, 0, &created("again")).await;

    assert!(matches!(result, Err(StorageError::Conflict { .. })));
}

pub async fn test_expected_ahead_of_stored_conflicts<S: EventLog>(store: &S) {
    let id = new_id();
    store.try_append(&id, 0, &created("a")).await.unwrap();

    let result = store.try_append(&id, 5, &renamed("future")).await;

    assert!(matches!(result, Err(StorageError::Conflict { .. })));
    assert_eq!(store.load_version(&id).await.unwrap(), Some(1));
}

pub async fn test_aggregate_isolation<S: EventLog>(store: &S) {
    let a = new_id();
    let b = new_id();

    store.try_append(&a, 0, &created("a")).await.unwrap();
    store.try_append(&a, 1, &renamed("a2")).await.unwrap();
    store.try_append(&b, 0, &created("b")).await.unwrap();

    assert_eq!(store.load_version(&a).await.unwrap(), Some(2));
    assert_eq!(store.load_version(&b).await.unwrap(), Some(1));
    assert_eq!(store.read_events(&b).await.unwrap().len(), 1);
}

pub async fn test_concurrent_appends_one_winner<S: EventLog + 'static>(store: Arc<S>) {
    let id = new_id();
    store.try_append(&id, 0, &created("a")).await.unwrap();

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.try_append(&id, 1, &renamed(&format!("r{i}"))).await })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(version) => {
                assert_eq!(version, 2);
                winners += 1;
            }
            Err(StorageError::Conflict { .. }) => {}
            Err(e) if e.is_transient() => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(winners, 1, "exactly one append at version 2 should win");
    assert_eq!(store.load_version(&id).await.unwrap(), Some(2));
    assert_eq!(store.read_events(&id).await.unwrap().len(), 2);
}

// =============================================================================
// ChangeFeed tests
// =============================================================================

pub async fn test_feed_reports_version_then_event<S: EventLog + ChangeFeed>(store: &S) {
    drain_feed(store).await;
    let id = new_id();

    store.try_append(&id, 0, &created("a")).await.unwrap();
    store.try_append(&id, 1, &renamed("b")).await.unwrap();

    let batch = store.poll(100).await.unwrap();
    assert_eq!(batch.len(), 4);
    assert!(batch.windows(2).all(|w| w[0].sequence < w[1].sequence));

    match (&batch[0].change, &batch[1].change) {
        (
            ChangeRecord::AggregateVersion { aggregate_id, version: 1 },
            ChangeRecord::Event(record),
        ) => {
            assert_eq!(aggregate_id, &id);
            assert_eq!(record.version, 1);
        }
        other => panic!("unexpected first pair: {other:?}"),
    }
    match &batch[3].change {
        ChangeRecord::Event(record) => {
            assert_eq!(record.version, 2);
            assert_eq!(record.event().unwrap(), renamed("b"));
        }
        other => panic!("expected event, got {other:?}"),
    }
}

pub async fn test_feed_keeps_unacked<S: EventLog + ChangeFeed>(store: &S) {
    drain_feed(store).await;
    let id = new_id();
    store.try_append(&id, 0, &created("a")).await.unwrap();

    let first = store.poll(1).await.unwrap();
    assert_eq!(first.len(), 1);
    let again = store.poll(1).await.unwrap();
    assert_eq!(again[0].sequence, first[0].sequence);

    store.ack(first[0].sequence).await.unwrap();
    let next = store.poll(10).await.unwrap();
    assert_eq!(next.len(), 1);
    assert!(matches!(next[0].change, ChangeRecord::Event(_)));
}

pub async fn test_failed_append_leaves_no_change<S: EventLog + ChangeFeed>(store: &S) {
    drain_feed(store).await;
    let id = new_id();
    store.try_append(&id, 0, &created("a")).await.unwrap();
    drain_feed(store).await;

    let _ = store.try_append(&id, 0, &created("conflict")).await;

    assert!(store.poll(10).await.unwrap().is_empty());
}

#[macro_export]
macro_rules! run_event_log_tests {
    ($store:expr) => {
        use $crate::storage::event_log_tests::*;

        test_unknown_aggregate_has_no_version(&*$store).await;
        println!("  test_unknown_aggregate_has_no_version: PASSED");

        test_append_from_zero(&*$store).await;
        println!("  test_append_from_zero: PASSED");

        test_sequential_appends_are_dense(&*$store).await;
        println!("  test_sequential_appends_are_dense: PASSED");

        test_stale_expected_version_conflicts(&*$store).await;
        println!("  test_stale_expected_version_conflicts: PASSED");

        test_create_twice_conflicts(&*$store).await;
        println!("  test_create_twice_conflicts: PASSED");

        test_expected_ahead_of_stored_conflicts(&*$store).await;
        println!("  test_expected_ahead_of_stored_conflicts: PASSED");

        test_aggregate_isolation(&*$store).await;
        println!("  test_aggregate_isolation: PASSED");

        test_concurrent_appends_one_winner($store.clone()).await;
        println!("  test_concurrent_appends_one_winner: PASSED");

        test_feed_reports_version_then_event(&*$store).await;
        println!("  test_feed_reports_version_then_event: PASSED");

        test_feed_keeps_unacked(&*$store).await;
        println!("  test_feed_keeps_unacked: PASSED");

        test_failed_append_leaves_no_change(&*$store).await;
        println!("  test_failed_append_leaves_no_change: PASSED");
    };
}
