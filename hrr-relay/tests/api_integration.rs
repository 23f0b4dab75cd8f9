//! Integration tests for the hrr-relay HTTP API
//!
//! Every test drives the real router, broadcast and scheduler through
//! `TestServer`. Resident tracks are a minute long so nothing ends mid-test.

mod helpers;

use std::time::Duration;

use axum::body::Body;
use helpers::TestServer;
use hrr_common::RadioEvent;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tokio::sync::broadcast::Receiver;

/// Wait for the first event matching `pred`
async fn next_event<F>(rx: &mut Receiver<RadioEvent>, pred: F) -> RadioEvent
where
    F: Fn(&RadioEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start(&[]).await;

    let (status, body) = server.request(Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "hrr-relay");

    server.shutdown().await;
}

#[tokio::test]
async fn test_listener_page_served() {
    let server = TestServer::start(&[]).await;

    let response = server
        .send(Request::get("/").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let page = String::from_utf8_lossy(&bytes);
    assert!(page.contains("/stream.mp3"));
    assert!(page.contains("/add"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_status_while_idle() {
    let server = TestServer::start(&[]).await;

    let (status, body) = server.request(Method::GET, "/status", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["state"], "idle");
    assert!(body["track"].is_null());
    assert_eq!(body["queue_length"], 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_status_while_playing() {
    let server = TestServer::start(&[("alpha", 60_000), ("beta", 60_000)]).await;
    server.wait_until_playing().await;

    let (status, body) = server.request(Method::GET, "/status", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["state"], "playing");
    assert_eq!(body["track"]["name"], "alpha");
    assert_eq!(body["queue_index"], 0);
    assert_eq!(body["queue_length"], 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_queue_lists_play_order() {
    let server = TestServer::start(&[("alpha", 60_000), ("beta", 60_000), ("gamma", 60_000)]).await;
    server.wait_until_playing().await;

    let (status, body) = server.request(Method::GET, "/queue", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["length"], 3);
    let names: Vec<_> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["alpha", "beta", "gamma"]);
    assert_eq!(body["entries"][0]["is_current"], true);
    assert_eq!(body["entries"][1]["is_current"], false);

    server.shutdown().await;
}

#[tokio::test]
async fn test_add_track_accepted_then_queued_next() {
    let server = TestServer::start(&[("alpha", 60_000), ("beta", 60_000)]).await;
    server.wait_until_playing().await;
    let mut events = server.events();

    let (status, body) = server
        .request(Method::POST, "/add", Some(json!({"track": "Night Drive"})))
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let body = body.unwrap();
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["query"], "Night Drive");
    let request_id = body["request_id"].as_str().unwrap().to_string();

    let added = next_event(&mut events, |e| matches!(e, RadioEvent::TrackAdded { .. })).await;
    match added {
        RadioEvent::TrackAdded {
            request_id: id,
            name,
            position,
            tracks_until_playback,
            ..
        } => {
            assert_eq!(id.to_string(), request_id);
            assert_eq!(name, "Night Drive");
            assert_eq!(position, 2);
            assert_eq!(tracks_until_playback, 0);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let (_, queue) = server.request(Method::GET, "/queue", None).await;
    let queue = queue.unwrap();
    assert_eq!(queue["length"], 3);
    assert_eq!(queue["entries"][1]["name"], "Night Drive");
    assert_eq!(queue["entries"][1]["provenance"], "acquired");

    server.shutdown().await;
}

#[tokio::test]
async fn test_add_track_plain_text_body() {
    let server = TestServer::start(&[("alpha", 60_000)]).await;
    let mut events = server.events();

    let response = server
        .send(
            Request::post("/add")
                .header("content-type", "text/plain")
                .body(Body::from("lofi beats\n"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    next_event(&mut events, |e| matches!(e, RadioEvent::TrackAdded { .. })).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_add_track_empty_query_rejected() {
    let server = TestServer::start(&[("alpha", 60_000)]).await;

    let (status, body) = server
        .request(Method::POST, "/add", Some(json!({"track": "   "})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["status"], "error");

    server.shutdown().await;
}

#[tokio::test]
async fn test_add_duplicate_rejected() {
    let server = TestServer::start(&[("alpha", 60_000)]).await;
    server.wait_until_playing().await;
    let mut events = server.events();

    let (status, _) = server
        .request(Method::POST, "/add", Some(json!({"track": "Some Song"})))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    next_event(&mut events, |e| matches!(e, RadioEvent::TrackAdded { .. })).await;

    // Query that names a queued source directly: rejected up front
    let (status, body) = server
        .request(Method::POST, "/add", Some(json!({"track": "stub:some-song"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.unwrap()["message"]
        .as_str()
        .unwrap()
        .contains("stub:some-song"));

    // Query that only resolves to a queued source: rejected after resolution
    let (status, _) = server
        .request(Method::POST, "/add", Some(json!({"track": "some song"})))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let rejected = next_event(&mut events, |e| {
        matches!(e, RadioEvent::DuplicateRejected { .. })
    })
    .await;
    match rejected {
        RadioEvent::DuplicateRejected { source_key, .. } => {
            assert_eq!(source_key, "stub:some-song")
        }
        other => panic!("unexpected event {other:?}"),
    }

    let (_, queue) = server.request(Method::GET, "/queue", None).await;
    assert_eq!(queue.unwrap()["length"], 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_add_failure_reported_as_event() {
    let server = TestServer::start(&[("alpha", 60_000)]).await;
    let mut events = server.events();

    let (status, _) = server
        .request(Method::POST, "/add", Some(json!({"track": "missing tape"})))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let failed = next_event(&mut events, |e| {
        matches!(e, RadioEvent::AcquisitionFailed { .. })
    })
    .await;
    match failed {
        RadioEvent::AcquisitionFailed { query, .. } => assert_eq!(query, "missing tape"),
        other => panic!("unexpected event {other:?}"),
    }

    let (_, queue) = server.request(Method::GET, "/queue", None).await;
    assert_eq!(queue.unwrap()["length"], 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_add_to_idle_broadcast_starts_playback() {
    let server = TestServer::start(&[]).await;
    let mut events = server.events();

    let (status, _) = server
        .request(Method::POST, "/add", Some(json!({"track": "first light"})))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let started = next_event(&mut events, |e| matches!(e, RadioEvent::TrackStarted { .. })).await;
    match started {
        RadioEvent::TrackStarted { name, .. } => assert_eq!(name, "first light"),
        other => panic!("unexpected event {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_skip_while_idle_conflicts() {
    let server = TestServer::start(&[]).await;

    let (status, _) = server.request(Method::POST, "/skip", None).await;

    assert_eq!(status, StatusCode::CONFLICT);

    server.shutdown().await;
}

#[tokio::test]
async fn test_skip_moves_to_next_track() {
    let server = TestServer::start(&[("alpha", 60_000), ("beta", 60_000)]).await;
    server.wait_until_playing().await;
    let mut events = server.events();

    let (status, body) = server.request(Method::POST, "/skip", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["track"]["name"], "alpha");

    let started = next_event(&mut events, |e| matches!(e, RadioEvent::TrackStarted { .. })).await;
    match started {
        RadioEvent::TrackStarted { name, .. } => assert_eq!(name, "beta"),
        other => panic!("unexpected event {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_remove_queue_entry() {
    let server = TestServer::start(&[("alpha", 60_000), ("beta", 60_000)]).await;
    server.wait_until_playing().await;

    let (_, queue) = server.request(Method::GET, "/queue", None).await;
    let beta_id = queue.unwrap()["entries"][1]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = server
        .request(Method::DELETE, &format!("/queue/{beta_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["track"]["name"], "beta");

    let (_, queue) = server.request(Method::GET, "/queue", None).await;
    assert_eq!(queue.unwrap()["length"], 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_remove_unknown_entry_not_found() {
    let server = TestServer::start(&[("alpha", 60_000)]).await;

    let (status, _) = server
        .request(
            Method::DELETE,
            "/queue/00000000-0000-0000-0000-000000000000",
            None,
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn test_stream_while_idle_is_no_content() {
    let server = TestServer::start(&[]).await;

    let response = server
        .send(Request::get("/stream").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    server.shutdown().await;
}

#[tokio::test]
async fn test_stream_while_playing_sends_audio() {
    let server = TestServer::start(&[("alpha", 60_000)]).await;
    server.wait_until_playing().await;

    let response = server
        .send(Request::get("/stream.mp3").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    assert_eq!(response.headers()["cache-control"], "no-cache, no-store");

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("no audio within lead window")
        .unwrap()
        .unwrap();
    let data = frame.into_data().unwrap();
    assert!(!data.is_empty());
    // Joined near the start of the track: the fixture header comes first
    assert_eq!(data[0], 0x10);
    assert_eq!(server.broadcast.listeners().count(), 1);

    drop(body);
    server.shutdown().await;
}

#[tokio::test]
async fn test_stream_listener_limit() {
    let settings = hrr_relay::config::StreamSettings {
        max_listeners: 1,
        ..Default::default()
    };
    let server = TestServer::start_with(&[("alpha", 60_000)], settings).await;
    server.wait_until_playing().await;

    let first = server
        .send(Request::get("/stream").body(Body::empty()).unwrap())
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = server
        .send(Request::get("/stream").body(Body::empty()).unwrap())
        .await;
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);

    drop(first);
    server.shutdown().await;
}

#[tokio::test]
async fn test_event_stream_connects_and_ends_on_shutdown() {
    let server = TestServer::start(&[]).await;

    let response = server
        .send(Request::get("/events").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let mut body = response.into_body();
    let first = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(first.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: ConnectionStatus"));
    assert!(text.contains("data: connected"));

    server.broadcast.shutdown();
    let end = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = body.frame().await {
            frame.unwrap();
        }
    })
    .await;
    assert!(end.is_ok(), "event stream still open after shutdown");

    server.shutdown().await;
}
