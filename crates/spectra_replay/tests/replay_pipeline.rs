//! Integration tests for the replay pipeline
//!
//! These tests verify that:
//! - A session read from the API is decoded, timed and turned into a timeline
//! - The playback clock stays usable when the engine reports no time
//! - Reloading replaces the engine instead of leaking it
//! - Timeline filtering and ordering hold over larger inputs

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use spectra_replay::headless::{EngineState, HeadlessEngineFactory};
use spectra_replay::replay::ClockMode;
use spectra_replay::testing::ScriptedHandle;
use spectra_replay::timeline::{aggregate, TimelineFilter};
use spectra_replay::{
    ClockConfig, LoaderConfig, Metadata, PlaybackAdapter, PlaybackClock, ReplayViewer,
    SessionLoader, Timestamp, ViewerConfig,
};
use std::io::Write;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn compressed_base64(text: &str) -> String {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    STANDARD.encode(encoder.finish().unwrap())
}

async fn serve(server: &MockServer, id: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/sessions/{id}/replay")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn mixed_session() -> Value {
    json!({
        "events": [
            { "timestamp": 1_000, "type": 4, "data": { "href": "/" } },
            r#"{"timestamp":1400,"type":3}"#,
            compressed_base64(r#"{"timestamp":2000,"type":3}"#),
            "????"
        ],
        "metadata": {
            "sessionId": "s-42",
            "userId": "u-7",
            "customEvents": [
                { "eventType": "click", "data": { "text": "Checkout" }, "timestamp": 1_500 },
                { "eventType": "network", "data": { "method": "POST", "url": "/cart" }, "timestamp": 1_200 }
            ],
            "errors": [{ "message": "payment declined", "timestamp": 1_800 }]
        }
    })
}

/// Test that a session fetched from the API is decoded and replayable
#[tokio::test]
async fn test_session_from_api_is_decoded_and_replayable() {
    let server = MockServer::start().await;
    serve(&server, "s-42", mixed_session()).await;
    let loader = SessionLoader::new(LoaderConfig::new(server.uri())).unwrap();

    let mut viewer = ReplayViewer::new(HeadlessEngineFactory::new(), ViewerConfig::default());
    assert!(viewer.load(&loader, "s-42").await);

    let session = viewer.session().unwrap();
    assert_eq!(session.events.len(), 4);
    assert_eq!(session.report.structured, 1);
    assert_eq!(session.report.json, 1);
    assert_eq!(session.report.base64_compressed, 1);
    assert_eq!(session.report.placeholders, 1);
    assert!(session.events[3].is_placeholder());

    assert!(viewer.is_engine_ready());
    assert!(viewer.status().load_error.is_none());

    let labels: Vec<String> = viewer
        .timeline_entries()
        .iter()
        .map(|e| format!("{}@{}", e.label(), e.timestamp.as_millis()))
        .collect();
    assert_eq!(labels, vec!["network@1200", "click@1500", "error@1800"]);
}

/// Test that a failing API leaves the viewer empty with a load error
#[tokio::test]
async fn test_failed_load_surfaces_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let loader = SessionLoader::new(LoaderConfig::new(server.uri())).unwrap();

    let mut viewer = ReplayViewer::new(HeadlessEngineFactory::new(), ViewerConfig::default());
    assert!(!viewer.load(&loader, "s-1").await);

    assert!(viewer.session().is_none());
    assert_eq!(
        viewer.status().load_error.as_deref(),
        Some("session could not be loaded")
    );
    assert_eq!(viewer.factory().built(), 0);
}

/// Test that a silent engine still gets a moving, bounded clock
#[tokio::test]
async fn test_silent_engine_interpolates_to_total() {
    let server = MockServer::start().await;
    serve(
        &server,
        "quiet",
        json!({ "events": [{ "timestamp": 10_000 }, { "timestamp": 11_000 }] }),
    )
    .await;
    let loader = SessionLoader::new(LoaderConfig::new(server.uri())).unwrap();

    let mut viewer = ReplayViewer::new(HeadlessEngineFactory::silent(), ViewerConfig::default());
    assert!(viewer.load(&loader, "quiet").await);
    assert!(viewer.play());

    let mut seen = Vec::new();
    for _ in 0..7 {
        assert_eq!(viewer.tick(), ClockMode::Interpolated);
        seen.push(viewer.clock().current_time().as_millis());
    }
    assert_eq!(seen, vec![200, 400, 600, 800, 1_000, 1_000, 1_000]);

    assert!(viewer.pause());
    assert_eq!(viewer.tick(), ClockMode::Held);
    assert_eq!(viewer.clock().current_time().as_millis(), 1_000);

    assert!(viewer.skip_back());
    assert_eq!(viewer.clock().current_time(), Timestamp::zero());
}

/// Test that loading another session disposes the previous engine
#[tokio::test]
async fn test_reload_replaces_engine() {
    let server = MockServer::start().await;
    serve(&server, "a", json!({ "events": [{ "timestamp": 1 }, { "timestamp": 5 }] })).await;
    serve(&server, "b", json!({ "events": [{ "timestamp": 2 }, { "timestamp": 9 }] })).await;
    let loader = SessionLoader::new(LoaderConfig::new(server.uri())).unwrap();

    let mut viewer = ReplayViewer::new(HeadlessEngineFactory::new(), ViewerConfig::default());
    viewer.load(&loader, "a").await;
    let first = viewer.factory().monitor().unwrap();

    viewer.load(&loader, "b").await;
    let second = viewer.factory().monitor().unwrap();

    assert_eq!(viewer.factory().built(), 2);
    assert_eq!(first.snapshot().state, EngineState::Destroyed);
    assert_eq!(second.snapshot().state, EngineState::Idle);
    assert_eq!(viewer.clock().total_time().as_millis(), 7);

    viewer.close();
    assert_eq!(second.snapshot().state, EngineState::Destroyed);
}

/// Test that controls reachable only through a value scan serve getters but not actions
#[test]
fn test_scan_only_engine() {
    let handle = ScriptedHandle::new().child(
        "internal",
        ScriptedHandle::new()
            .returns("getCurrentTime", json!(640))
            .returns("play", Value::Null),
    );
    let log = handle.log();
    let mut adapter = PlaybackAdapter::attach(Box::new(handle), Metadata::default()).unwrap();
    let mut clock = PlaybackClock::new(ClockConfig::default());

    assert_eq!(adapter.current_time().as_millis(), 640);
    assert!(!clock.play(Some(&mut adapter)));
    assert!(!clock.is_playing());
    assert_eq!(log.names(), vec!["internal.getCurrentTime"]);
}

/// Test ordering and filter/search conjunction over many entries
#[test]
fn test_timeline_ordering_and_conjunction() {
    let kinds = ["click", "network", "console", "navigation"];
    let custom_events: Vec<Value> = (0..40u64)
        .map(|i| {
            json!({
                "eventType": kinds[(i % 4) as usize],
                "data": { "text": if i % 3 == 0 { "Foo" } else { "bar" } },
                "timestamp": (i * 7_919) % 1_000,
            })
        })
        .collect();
    let errors: Vec<Value> = (0..10u64)
        .map(|i| json!({ "message": format!("error {i}"), "timestamp": (i * 104_729) % 1_000 }))
        .collect();
    let metadata: Metadata = serde_json::from_value(json!({
        "customEvents": custom_events,
        "errors": errors,
    }))
    .unwrap();

    let all = aggregate(&metadata, &TimelineFilter::All, "");
    assert_eq!(all.len(), 50);
    assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let clicks = aggregate(&metadata, &TimelineFilter::only("click"), "foo");
    assert!(!clicks.is_empty());
    for entry in &clicks {
        assert_eq!(entry.event_type(), "click");
        let json = serde_json::to_string(&entry.event).unwrap().to_lowercase();
        assert!(json.contains("foo"));
    }
    assert_eq!(clicks.len(), (0..40).filter(|i| i % 4 == 0 && i % 3 == 0).count());
}
