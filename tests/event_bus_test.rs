//! Cross-domain messaging over the event bus

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleetcore::domain::models::{event_types, EventBusConfig};
use fleetcore::{BusError, BusEvent, EventBus};
use serde_json::json;

#[tokio::test]
async fn test_domain_answers_request_from_subscriber() {
    let bus = EventBus::default();
    let responder = bus.clone();
    let _sub = bus.subscribe("coverage.gaps.requested", move |request| {
        let gaps = request.payload["files"].as_array().map_or(0, Vec::len);
        responder.publish(BusEvent::reply(
            request,
            "coverage.gaps.reported",
            json!({ "gaps": gaps }),
        ));
    });

    let response = bus
        .request(
            BusEvent::new("coverage.gaps.requested", json!({ "files": ["a.rs", "b.rs"] }))
                .with_source("test-generation"),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(response.event_type, "coverage.gaps.reported");
    assert_eq!(response.payload["gaps"], 2);
    assert_eq!(bus.pending_requests(), 0);
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let bus = EventBus::default();
    let err = bus
        .request(BusEvent::new("defect.predict", json!({})), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Timeout { timeout_ms: 20, .. }));
    assert_eq!(bus.pending_requests(), 0);
}

#[tokio::test]
async fn test_stream_sees_events_in_sequence_order() {
    let bus = EventBus::new(&EventBusConfig {
        history_capacity: 4,
        channel_capacity: 64,
    });
    let mut stream = bus.stream();

    let publisher = bus.clone();
    tokio::spawn(async move {
        for i in 0..10 {
            publisher.publish(BusEvent::new("quality.assessed", json!({ "run": i })));
        }
    })
    .await
    .unwrap();

    let mut sequences = Vec::new();
    for _ in 0..10 {
        sequences.push(stream.recv().await.unwrap().sequence);
    }
    assert_eq!(sequences, (0..10).collect::<Vec<u64>>());

    let history: Vec<u64> = bus.history().iter().map(|e| e.sequence).collect();
    assert_eq!(history, vec![6, 7, 8, 9]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_keep_history_in_sequence_order() {
    let bus = EventBus::new(&EventBusConfig {
        history_capacity: 1_000,
        channel_capacity: 1_024,
    });
    let mut stream = bus.stream();

    let publishers: Vec<_> = (0..4)
        .map(|domain| {
            let bus = bus.clone();
            tokio::spawn(async move {
                for run in 0..200 {
                    bus.publish(BusEvent::new(
                        "coverage.measured",
                        json!({ "domain": domain, "run": run }),
                    ));
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.await.unwrap();
    }

    let history: Vec<u64> = bus.history().iter().map(|e| e.sequence).collect();
    assert_eq!(history, (0..800).collect::<Vec<u64>>());

    let mut streamed = Vec::new();
    for _ in 0..800 {
        streamed.push(stream.recv().await.unwrap().sequence);
    }
    assert_eq!(streamed, history);
}

#[test]
fn test_wildcard_and_typed_subscribers_after_dispose() {
    let bus = EventBus::default();
    let typed = Arc::new(AtomicUsize::new(0));
    let all = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&typed);
    let _typed = bus.subscribe(event_types::TASK_COMPLETED, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&all);
    let _all = bus.subscribe(event_types::WILDCARD, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(BusEvent::new(event_types::TASK_COMPLETED, json!({})));
    bus.publish(BusEvent::new(event_types::TASK_QUEUED, json!({})));
    bus.dispose();
    bus.publish(BusEvent::new(event_types::TASK_COMPLETED, json!({})));

    assert_eq!(typed.load(Ordering::SeqCst), 1);
    assert_eq!(all.load(Ordering::SeqCst), 2);
    assert!(bus.is_disposed());
}
