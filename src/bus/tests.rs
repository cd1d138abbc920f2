use serde_json::json;

use super::*;

#[test]
fn test_relay_message_wire_format() {
    let message = RelayMessage {
        aggregate_id: "r1".to_string(),
        version: 2,
        event_data: json!({"type": "ROOM_RENAMED", "name": "Algebra II"}),
    };
    assert_eq!(
        serde_json::to_value(&message).unwrap(),
        json!({
            "aggregateId": "r1",
            "version": 2,
            "eventData": {"type": "ROOM_RENAMED", "name": "Algebra II"}
        })
    );
}

#[test]
fn test_from_record_parses_json_data() {
    let record = EventRecord::new("r1", 1, r#"{"type":"ROOM_DELETED"}"#);
    let message = RelayMessage::from_record(&record);
    assert_eq!(message.event_data, json!({"type": "ROOM_DELETED"}));
    assert_eq!(message.version, 1);
}

#[test]
fn test_from_record_keeps_non_json_data_as_string() {
    let record = EventRecord::new("r1", 1, "{broken");
    let message = RelayMessage::from_record(&record);
    assert_eq!(message.event_data, json!("{broken"));
}

#[test]
fn test_delivery_decode_rejects_garbage() {
    let delivery = Delivery {
        receipt: "x".to_string(),
        body: "not json".to_string(),
        receive_count: 1,
    };
    assert!(delivery.decode().is_err());
}

#[test]
fn test_messaging_config_defaults_to_channel() {
    let config = MessagingConfig::default();
    assert_eq!(config.queue_type, QueueType::Channel);
    assert_eq!(config.channel.visibility_timeout_ms, 30_000);
    assert!(config.chaos.is_none());
}

#[tokio::test]
async fn test_init_queue_channel() {
    let queue = init_queue(&MessagingConfig::default(), "new-events")
        .await
        .unwrap();
    queue
        .send(&RelayMessage::from_record(&EventRecord::new("r1", 1, "{}")))
        .await
        .unwrap();
    assert_eq!(
        queue
            .receive(10, std::time::Duration::ZERO)
            .await
            .unwrap()
            .len(),
        1
    );
}
