use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::*;
use crate::domain::{EventRecord, Room};
use crate::storage::MemoryEventLog;

fn fast_config() -> CommandConfig {
    CommandConfig {
        max_retries: 3,
        min_backoff_ms: 1,
        max_backoff_ms: 2,
    }
}

fn handler() -> (Arc<MemoryEventLog>, CommandHandler) {
    let log = Arc::new(MemoryEventLog::new());
    let handler = CommandHandler::new(log.clone(), fast_config());
    (log, handler)
}

/// Event log that lets a competing writer win the first `races` appends.
struct RacingLog {
    inner: MemoryEventLog,
    races: AtomicU32,
}

impl RacingLog {
    fn new(races: u32) -> Self {
        Self {
            inner: MemoryEventLog::new(),
            races: AtomicU32::new(races),
        }
    }
}

#[async_trait]
impl EventLog for RacingLog {
    async fn load_version(&self, aggregate_id: &str) -> crate::storage::Result<Option<u64>> {
        self.inner.load_version(aggregate_id).await
    }

    async fn try_append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        event: &RoomEvent,
    ) -> crate::storage::Result<u64> {
        let remaining = self.races.load(Ordering::SeqCst);
        if remaining > 0 {
            self.races.store(remaining - 1, Ordering::SeqCst);
            let competing = RoomEvent::RoomRenamed {
                name: format!("competitor-{remaining}"),
            };
            self.inner
                .try_append(aggregate_id, expected_version, &competing)
                .await?;
        }
        self.inner
            .try_append(aggregate_id, expected_version, event)
            .await
    }

    async fn read_events(&self, aggregate_id: &str) -> crate::storage::Result<Vec<EventRecord>> {
        self.inner.read_events(aggregate_id).await
    }
}

#[tokio::test]
async fn test_create_room_starts_at_version_one() {
    let (log, handler) = handler();

    let id = handler
        .create_room("Algebra", Some("Tuesdays"))
        .await
        .unwrap();

    assert_eq!(log.load_version(&id).await.unwrap(), Some(1));
    let events = log.read_events(&id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].event().unwrap(),
        RoomEvent::RoomCreated {
            name: "Algebra".to_string(),
            description: Some("Tuesdays".to_string()),
        }
    );
}

#[tokio::test]
async fn test_create_room_ids_are_unique() {
    let (_, handler) = handler();

    let a = handler.create_room("A", None).await.unwrap();
    let b = handler.create_room("A", None).await.unwrap();

    assert_ne!(a, b);
}

#[tokio::test]
async fn test_blank_name_is_rejected_without_writing() {
    let (log, handler) = handler();

    let result = handler.create_room("   ", None).await;

    assert!(matches!(result, Err(CommandError::InvalidCommand(_))));
    assert_eq!(log.pending_changes().await, 0);
}

#[tokio::test]
async fn test_commands_on_missing_room_fail_not_found() {
    let (_, handler) = handler();

    assert!(matches!(
        handler.rename_room("nope", "x").await,
        Err(CommandError::AggregateNotFound(id)) if id == "nope"
    ));
    assert!(matches!(
        handler.delete_room("nope").await,
        Err(CommandError::AggregateNotFound(_))
    ));
    assert!(matches!(
        handler.schedule_session("nope", "0 9 * * 1", None).await,
        Err(CommandError::AggregateNotFound(_))
    ));
    assert!(matches!(
        handler.invite("nope", vec![Invitee::new("User", "u1")]).await,
        Err(CommandError::AggregateNotFound(_))
    ));
}

#[tokio::test]
async fn test_each_command_appends_the_next_version() {
    let (log, handler) = handler();
    let id = handler.create_room("Algebra", None).await.unwrap();

    handler.rename_room(&id, "Algebra II").await.unwrap();
    let schedule_id = handler
        .schedule_session(&id, "0 9 * * 1", Some("2027-01-01"))
        .await
        .unwrap();
    handler
        .invite(&id, vec![Invitee::new("User", "u1"), Invitee::new("Group", "g1")])
        .await
        .unwrap();
    handler.delete_room(&id).await.unwrap();

    let events = log.read_events(&id).await.unwrap();
    let versions: Vec<u64> = events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);

    let room = Room::replay(&id, &events).unwrap();
    assert_eq!(room.version, 5);
    assert_eq!(room.name.as_deref(), Some("Algebra II"));
    assert!(room.deleted);
    assert_eq!(room.invitees.len(), 2);
    assert_eq!(room.schedules.len(), 1);
    assert_eq!(room.schedules[0].id, schedule_id);
    assert_eq!(room.schedules[0].stop_after.as_deref(), Some("2027-01-01"));
}

#[tokio::test]
async fn test_blank_cron_is_rejected() {
    let (_, handler) = handler();
    let id = handler.create_room("Algebra", None).await.unwrap();

    let result = handler.schedule_session(&id, "", None).await;

    assert!(matches!(result, Err(CommandError::InvalidCommand(_))));
}

#[tokio::test]
async fn test_conflict_is_retried_from_a_fresh_version() {
    let log = Arc::new(RacingLog::new(0));
    let handler = CommandHandler::new(log.clone(), fast_config());
    let id = handler.create_room("Algebra", None).await.unwrap();

    log.races.store(2, Ordering::SeqCst);
    handler.rename_room(&id, "Mine").await.unwrap();

    let events = log.read_events(&id).await.unwrap();
    assert_eq!(events.len(), 4);
    let room = Room::replay(&id, &events).unwrap();
    assert_eq!(room.name.as_deref(), Some("Mine"));
}

#[tokio::test]
async fn test_conflict_retries_are_bounded() {
    let log = Arc::new(RacingLog::new(0));
    let handler = CommandHandler::new(log.clone(), fast_config());
    let id = handler.create_room("Algebra", None).await.unwrap();

    log.races.store(100, Ordering::SeqCst);
    let result = handler.rename_room(&id, "Mine").await;

    assert!(matches!(result, Err(CommandError::Conflict { .. })));
    // Initial attempt plus three retries, each lost to a competitor.
    assert_eq!(log.read_events(&id).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_transient_failure_is_retried_then_surfaced() {
    let (log, handler) = handler();
    let id = handler.create_room("Algebra", None).await.unwrap();

    log.set_fail_on_append(true).await;
    let result = handler.rename_room(&id, "Other").await;

    match result {
        Err(e @ CommandError::Store(_)) => assert!(e.is_retryable()),
        other => panic!("expected store error, got {other:?}"),
    }
    assert_eq!(log.load_version(&id).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_concurrent_commands_commit_distinct_versions() {
    let log = Arc::new(MemoryEventLog::new());
    let handler = Arc::new(CommandHandler::new(
        log.clone(),
        CommandConfig {
            max_retries: 20,
            min_backoff_ms: 1,
            max_backoff_ms: 5,
        },
    ));
    let id = handler.create_room("Algebra", None).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let handler = handler.clone();
            let id = id.clone();
            tokio::spawn(async move { handler.rename_room(&id, &format!("n{i}")).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let versions: Vec<u64> = log
        .read_events(&id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.version)
        .collect();
    assert_eq!(versions, (1..=9).collect::<Vec<u64>>());
}

#[test]
fn test_storage_errors_map_to_command_errors() {
    let conflict: CommandError = StorageError::Conflict {
        aggregate_id: "r1".to_string(),
        expected: 3,
    }
    .into();
    assert!(matches!(conflict, CommandError::Conflict { ref aggregate_id } if aggregate_id == "r1"));
    assert!(conflict.is_retryable());

    let missing: CommandError = StorageError::AggregateNotFound("r1".to_string()).into();
    assert!(!missing.is_retryable());

    let unavailable: CommandError = StorageError::Unavailable("down".to_string()).into();
    assert!(!unavailable.is_retryable());
}
