//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they:
//! - Require Docker to be running (for testcontainers)
//! - Take 15-60 seconds per test to spin up Kafka
//!
//! To run explicitly:
//! ```bash
//! cargo test -p parking-sim-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use chrono::{TimeZone, Utc};
use futures::StreamExt;
use parking_sim_core::event_bus::{EventBus, EventStream, Message};
use parking_sim_core::{EntryEvent, ExitEvent, ParkingEvent, VehiclePlate};
use parking_sim_redpanda::RedpandaEventBus;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

const WARMUP_KEY: &str = "warmup";

/// Start a broker and return it with its bootstrap address.
async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

/// Publish a warmup message until the topic exists.
async fn ensure_topic_exists(event_bus: &RedpandaEventBus, topic: &str) {
    let warmup = Message::new(WARMUP_KEY, b"{}".to_vec());
    for attempt in 1..=60 {
        if event_bus.publish(topic, &warmup).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(2)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(attempt != 60, "Failed to create topic {topic}");
    }
}

/// Collect `count` non-warmup messages or panic after `timeout`.
async fn collect(stream: &mut EventStream, count: usize, timeout: Duration) -> Vec<Message> {
    let mut received = Vec::new();
    tokio::time::timeout(timeout, async {
        while received.len() < count {
            match stream.next().await {
                Some(Ok(message)) if message.key != WARMUP_KEY => received.push(message),
                Some(_) => {}
                None => break,
            }
        }
    })
    .await
    .expect("Timeout waiting for messages");
    received
}

#[tokio::test]
#[ignore]
async fn ping_reaches_the_broker() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = RedpandaEventBus::new(&brokers).expect("Failed to create event bus");

    let mut ok = false;
    for _ in 0..30 {
        if event_bus.ping().await.is_ok() {
            ok = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(ok, "broker never answered a metadata request");
}

#[tokio::test]
#[ignore]
async fn ping_fails_without_a_broker() {
    let event_bus = RedpandaEventBus::builder()
        .brokers("127.0.0.1:1")
        .timeout(Duration::from_millis(500))
        .build()
        .expect("Failed to create event bus");

    assert!(event_bus.ping().await.is_err());
}

#[tokio::test]
#[ignore]
async fn entry_event_round_trips_with_plate_key() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("round-trip")
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&event_bus, "entry_events_queue").await;

    let entered = Utc
        .with_ymd_and_hms(2024, 9, 11, 10, 0, 0)
        .single()
        .expect("valid timestamp");
    let event = EntryEvent::new(VehiclePlate::new("ABC123"), entered);
    let payload = event.to_json().expect("encode");

    event_bus
        .publish("entry_events_queue", &Message::new("ABC123", payload.clone()))
        .await
        .expect("Failed to publish");

    let mut stream = event_bus
        .subscribe(&["entry_events_queue"])
        .await
        .expect("Failed to subscribe");
    let received = collect(&mut stream, 1, Duration::from_secs(20)).await;

    assert_eq!(received[0].key, "ABC123");
    assert_eq!(received[0].payload, payload);
    assert_eq!(EntryEvent::from_json(&received[0].payload).expect("decode"), event);
}

#[tokio::test]
#[ignore]
async fn malformed_payloads_are_delivered_untouched() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("malformed")
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&event_bus, "exit_events_queue").await;

    event_bus
        .publish("exit_events_queue", &Message::new("XYZ", b"not json".to_vec()))
        .await
        .expect("Failed to publish");
    event_bus
        .publish("exit_events_queue", &Message::new("XYZ", Vec::new()))
        .await
        .expect("Failed to publish");

    let mut stream = event_bus
        .subscribe(&["exit_events_queue"])
        .await
        .expect("Failed to subscribe");
    let received = collect(&mut stream, 2, Duration::from_secs(20)).await;

    assert_eq!(received[0].payload, b"not json");
    assert!(received[1].payload.is_empty());
    assert!(ExitEvent::from_json(&received[0].payload).is_err());
}

#[tokio::test]
#[ignore]
async fn entry_and_exit_subscriptions_are_independent() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("parking-record-keeper")
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&event_bus, "entries").await;
    ensure_topic_exists(&event_bus, "exits").await;

    let mut entries = event_bus.subscribe(&["entries"]).await.expect("subscribe");
    let mut exits = event_bus.subscribe(&["exits"]).await.expect("subscribe");

    for i in 0..3 {
        let plate = format!("plate-{i}");
        event_bus
            .publish("entries", &Message::new(plate.clone(), b"{}".to_vec()))
            .await
            .expect("publish entry");
        event_bus
            .publish("exits", &Message::new(plate, b"{}".to_vec()))
            .await
            .expect("publish exit");
    }

    let from_entries = collect(&mut entries, 3, Duration::from_secs(30)).await;
    let from_exits = collect(&mut exits, 3, Duration::from_secs(30)).await;
    assert_eq!(from_entries.len(), 3);
    assert_eq!(from_exits.len(), 3);
}

#[tokio::test]
#[ignore]
async fn only_acknowledged_messages_are_skipped_by_the_group() {
    let (_kafka, brokers) = start_kafka().await;
    let build = || {
        RedpandaEventBus::builder()
            .brokers(&brokers)
            .consumer_group("commit-test")
            .auto_offset_reset("earliest")
            .build()
            .expect("Failed to create event bus")
    };
    let event_bus = build();
    ensure_topic_exists(&event_bus, "committed").await;

    for key in ["first", "second"] {
        event_bus
            .publish("committed", &Message::new(key, b"{}".to_vec()))
            .await
            .expect("publish");
    }
    {
        let mut stream = event_bus.subscribe(&["committed"]).await.expect("subscribe");
        // asking for "second" acknowledges "first"; "second" is never acknowledged
        let received = collect(&mut stream, 2, Duration::from_secs(20)).await;
        let keys: Vec<_> = received.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["first", "second"]);
        // give the async commit time to land
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    let event_bus = build();
    event_bus
        .publish("committed", &Message::new("third", b"{}".to_vec()))
        .await
        .expect("publish");
    let mut stream = event_bus.subscribe(&["committed"]).await.expect("subscribe");
    let received = collect(&mut stream, 2, Duration::from_secs(30)).await;
    let keys: Vec<_> = received.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(keys, ["second", "third"]);
}
