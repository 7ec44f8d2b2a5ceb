//! Integration tests for the observer API endpoints.
//!
//! Most tests drive the Axum `Router` directly via `tower::ServiceExt`
//! without starting a TCP server. The last one binds a real listener to
//! check the background startup path.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

use delineator_core::SharedStore;
use delineator_observer::router::build_router;
use delineator_observer::server::ServerConfig;
use delineator_observer::spawn_observer;
use delineator_observer::state::AppState;
use delineator_types::{
    DetectionSource, Direction, Incident, IncidentId, IncidentStatus, Node, NodeHealth, NodeId,
    Severity, SignalState,
};

fn node(id: &str, direction: Direction, position: f64) -> Node {
    Node {
        id: NodeId::from(id),
        direction,
        lane: 1,
        position,
        health: NodeHealth::Ok,
        battery: 90.0,
        signal: SignalState::OFF,
        last_heartbeat: Utc::now(),
    }
}

fn incident(id: &str, position: f64, status: IncidentStatus, age_min: i64) -> Incident {
    Incident {
        id: IncidentId::from(id),
        location: format!("{position}m Mark"),
        position,
        direction: Direction::North,
        lane: 1,
        severity: Severity::Critical,
        status,
        start_time: Utc::now() - Duration::minutes(age_min),
        clear_time: None,
        detected_by: DetectionSource::Cctv,
    }
    .normalized()
}

async fn make_test_state() -> Arc<AppState> {
    let store = SharedStore::default();
    store
        .seed(
            vec![
                node("N-150", Direction::North, 150.0),
                node("N-400", Direction::North, 400.0),
                node("S-150", Direction::South, 150.0),
            ],
            vec![
                incident("I-OLD", 300.0, IncidentStatus::Cleared, 30),
                incident("I-NEW", 100.0, IncidentStatus::Active, 1),
            ],
        )
        .await;
    Arc::new(AppState::new(store))
}

async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = build_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn healthz_is_ok() {
    let (status, json) = get_json(make_test_state().await, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.get("status").unwrap().as_str(), Some("ok"));
}

#[tokio::test]
async fn lists_nodes_with_signal_fields() {
    let (status, json) = get_json(make_test_state().await, "/api/nodes").await;
    assert_eq!(status, StatusCode::OK);
    let nodes = json.as_array().unwrap();
    assert_eq!(nodes.len(), 3);

    let n150 = nodes
        .iter()
        .find(|n| n.get("id").unwrap().as_str() == Some("N-150"))
        .unwrap();
    assert_eq!(n150.get("ledColor").unwrap().as_str(), Some("red"));
    assert_eq!(n150.get("blinkHz").unwrap(), 3.0);
}

#[tokio::test]
async fn filters_nodes_by_direction() {
    let (status, json) = get_json(make_test_state().await, "/api/nodes?direction=south").await;
    assert_eq!(status, StatusCode::OK);
    let nodes = json.as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes.first().unwrap().get("ledColor").unwrap().as_str(), Some("off"));
}

#[tokio::test]
async fn single_node_and_missing_node() {
    let state = make_test_state().await;
    let (status, json) = get_json(Arc::clone(&state), "/api/nodes/N-400").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.get("ledColor").unwrap().as_str(), Some("green"));

    let (status, json) = get_json(state, "/api/nodes/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json.get("status").unwrap(), 404);
}

#[tokio::test]
async fn incidents_newest_first_and_filtered() {
    let state = make_test_state().await;
    let (_, json) = get_json(Arc::clone(&state), "/api/incidents").await;
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i.get("id").unwrap().as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["I-NEW", "I-OLD"]);

    let (_, json) = get_json(Arc::clone(&state), "/api/incidents?status=cleared").await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, _) = get_json(state, "/api/incidents?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_reports_aggregate() {
    let (status, json) = get_json(make_test_state().await, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.get("status").unwrap().as_str(), Some("critical"));
    assert_eq!(json.get("nodes").unwrap(), 3);
    assert_eq!(json.get("active_incidents").unwrap(), 1);
    assert_eq!(json.pointer("/illumination/red").unwrap(), 1);
    assert_eq!(json.pointer("/illumination/green").unwrap(), 1);
    assert!(json.get("sync").unwrap().is_null());
}

#[tokio::test]
async fn events_respect_limit() {
    let state = make_test_state().await;
    let (_, json) = get_json(Arc::clone(&state), "/api/events").await;
    let all = json.as_array().unwrap().len();
    assert!(all >= 2);

    let (_, json) = get_json(state, "/api/events?limit=1").await;
    let events = json.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events.first().unwrap().get("type").is_some());
}

#[tokio::test]
async fn spawned_observer_serves_until_shutdown() {
    let state = make_test_state().await;
    let config = ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
    };
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = spawn_observer(&config, state, async move {
        let _ = stop_rx.await;
    })
    .await
    .unwrap();

    let mut stream = tokio::net::TcpStream::connect(handle.addr).await.unwrap();
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));

    stop_tx.send(()).unwrap();
    handle.task.await.unwrap();
}
