//! Summary collector client against a mock HTTP server.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Utc};
use parking_sim_core::event_bus::{EventBus, Message};
use parking_sim_core::{
    EntryEvent, ExitEvent, ParkingEvent, ParkingSummary, SinkError, SummarySink, VehiclePlate,
};
use parking_sim_runtime::record_keeper::{RecordKeeper, RecordKeeperSettings};
use parking_sim_testing::{InMemoryEventBus, MockRecordStore};
use parking_simulator::HttpSummarySink;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn at(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
}

fn summary() -> ParkingSummary {
    ParkingSummary::generate(
        VehiclePlate::new("ABC123"),
        at("2024-09-11T10:00:00Z"),
        at("2024-09-11T11:30:00Z"),
    )
    .unwrap()
}

#[tokio::test]
async fn created_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parkinglog"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({
            "vehicle_plate": "ABC123",
            "exit_date_time": "2024-09-11T11:30:00Z",
            "entry_date_time": "2024-09-11T10:00:00Z",
            "duration": "1h30m0s",
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let sink = HttpSummarySink::new(format!("{}/parkinglog", server.uri()), None).unwrap();
    sink.submit(&summary()).await.unwrap();
}

#[tokio::test]
async fn any_other_status_is_a_rejection() {
    for status in [200, 400, 422, 500] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let sink = HttpSummarySink::new(server.uri(), None).unwrap();
        assert_eq!(
            sink.submit(&summary()).await,
            Err(SinkError::Rejected { status })
        );
    }
}

#[tokio::test]
async fn unreachable_collector_is_a_transport_error() {
    let sink = HttpSummarySink::new("http://127.0.0.1:1/parkinglog", None).unwrap();
    assert!(matches!(
        sink.submit(&summary()).await,
        Err(SinkError::Transport(_))
    ));
}

#[tokio::test]
async fn slow_collector_times_out_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let sink = HttpSummarySink::new(server.uri(), Some(Duration::from_millis(100))).unwrap();
    assert!(matches!(
        sink.submit(&summary()).await,
        Err(SinkError::Transport(_))
    ));
}

#[tokio::test]
async fn record_keeper_posts_to_collector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parkinglog"))
        .and(body_json(serde_json::json!({
            "vehicle_plate": "plate-42",
            "exit_date_time": "2024-09-11T10:01:02.500Z",
            "entry_date_time": "2024-09-11T10:00:00Z",
            "duration": "1m2.5s",
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let bus = InMemoryEventBus::new();
    let records = MockRecordStore::new();
    records
        .seed(
            &VehiclePlate::new("plate-42"),
            parking_sim_core::RecordField::EntryDateTime,
            at("2024-09-11T10:00:00Z"),
        )
        .unwrap();

    let exit = ExitEvent::new(VehiclePlate::new("plate-42"), at("2024-09-11T10:01:02.5Z"));
    bus.publish("exits", &Message::new("plate-42", exit.to_json().unwrap()))
        .await
        .unwrap();
    // an entry for another vehicle produces no POST
    let entry = EntryEvent::new(VehiclePlate::new("plate-7"), at("2024-09-11T10:00:30Z"));
    bus.publish("entries", &Message::new("plate-7", entry.to_json().unwrap()))
        .await
        .unwrap();
    bus.close();

    let sink = HttpSummarySink::new(format!("{}/parkinglog", server.uri()), None).unwrap();
    let (keeper, _shutdown) = RecordKeeper::new(
        Arc::new(bus),
        records,
        sink,
        RecordKeeperSettings {
            entry_topic: "entries".to_string(),
            exit_topic: "exits".to_string(),
        },
    );
    let report = keeper.run().await.unwrap();

    assert_eq!(report.exit.processed, 1);
    assert_eq!(report.entry.processed, 1);
}
