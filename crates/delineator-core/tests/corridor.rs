//! End-to-end corridor scenarios: wire-format deltas decoded and applied
//! through the shared store, checked against the resulting signals.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use serde_json::json;

use delineator_core::{ChangeKind, DeltaOutcome, EntityStore, SharedStore, StoreSettings};
use delineator_types::{
    Delta, Direction, LedColor, Node, NodeHealth, NodeId, SignalState, SystemStatus,
};

fn node(id: &str, direction: Direction, position: f64) -> Node {
    Node {
        id: NodeId::from(id),
        direction,
        lane: 1,
        position,
        health: NodeHealth::Ok,
        battery: 100.0,
        signal: SignalState::OFF,
        last_heartbeat: Utc::now(),
    }
}

fn corridor() -> Vec<Node> {
    vec![
        node("N-050", Direction::North, 50.0),
        node("N-250", Direction::North, 250.0),
        node("N-500", Direction::North, 500.0),
        node("N-850", Direction::North, 850.0),
        node("S-250", Direction::South, 250.0),
    ]
}

fn decode(value: &serde_json::Value) -> Delta {
    Delta::decode(&value.to_string()).unwrap()
}

fn incident_new(id: &str, position: f64, severity: u8) -> Delta {
    decode(&json!({
        "type": "incident_new",
        "payload": {
            "id": id,
            "location": format!("{position}m Mark"),
            "position": position,
            "direction": "north",
            "lane": 2,
            "severity": severity,
            "status": "active",
            "startTime": Utc::now().to_rfc3339(),
            "detectedBy": "sensor"
        }
    }))
}

fn incident_clear(id: &str) -> Delta {
    decode(&json!({"type": "incident_clear", "payload": {"id": id}}))
}

async fn colors(store: &SharedStore) -> Vec<(String, LedColor)> {
    store
        .read()
        .await
        .nodes()
        .map(|n| (n.id.to_string(), n.signal.color()))
        .collect()
}

#[tokio::test]
async fn incident_at_100m_lights_the_upstream_corridor() {
    let store = SharedStore::default();
    store.seed(corridor(), Vec::new()).await;

    assert_eq!(
        store.apply(incident_new("I-1", 100.0, 2)).await,
        DeltaOutcome::Applied
    );
    assert_eq!(
        colors(&store).await,
        vec![
            (String::from("N-050"), LedColor::Off),
            (String::from("N-250"), LedColor::Red),
            (String::from("N-500"), LedColor::Green),
            (String::from("N-850"), LedColor::Off),
            (String::from("S-250"), LedColor::Off),
        ]
    );
    assert_eq!(store.read().await.status(), SystemStatus::Warning);
}

#[tokio::test]
async fn clearing_restores_a_dark_corridor() {
    let store = SharedStore::default();
    store.seed(corridor(), Vec::new()).await;
    let mut changes = store.subscribe();

    store.apply(incident_new("I-1", 100.0, 1)).await;
    store.apply(incident_new("I-2", 300.0, 3)).await;
    store.apply(incident_clear("I-1")).await;
    assert!(colors(&store).await.iter().any(|(_, c)| c.is_lit()));

    store.apply(incident_clear("I-2")).await;
    assert!(colors(&store).await.iter().all(|(_, c)| *c == LedColor::Off));
    assert_eq!(store.read().await.status(), SystemStatus::Normal);

    let kinds: Vec<ChangeKind> = std::iter::from_fn(|| changes.try_recv().ok())
        .map(|c| c.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ChangeKind::IncidentNew,
            ChangeKind::IncidentNew,
            ChangeKind::IncidentClear,
            ChangeKind::IncidentClear,
        ]
    );
}

#[tokio::test]
async fn node_update_moves_a_node_into_range() {
    let store = SharedStore::new(EntityStore::new(&StoreSettings::default()), 16);
    store.seed(corridor(), Vec::new()).await;
    store.apply(incident_new("I-1", 100.0, 2)).await;

    let moved = decode(&json!({
        "type": "node_update",
        "payload": {"id": "N-850", "position": 650.0, "battery": 140.0}
    }));
    assert_eq!(store.apply(moved).await, DeltaOutcome::Applied);

    let guard = store.read().await;
    let n = guard.node("N-850").unwrap();
    assert_eq!(n.signal.color(), LedColor::Blue);
    assert!(n.battery <= 100.0);
}

#[tokio::test]
async fn undecodable_and_unknown_messages_leave_state_alone() {
    let store = SharedStore::default();
    store.seed(corridor(), Vec::new()).await;
    let before = store.revision().await;

    assert!(Delta::decode("{not json").is_err());
    assert!(Delta::decode(r#"{"type":"incident_new","payload":{"id":1}}"#).is_err());
    let unknown = decode(&json!({"type": "weather", "payload": {"rain": true}}));
    assert_eq!(store.apply(unknown).await, DeltaOutcome::Ignored);
    assert_eq!(
        store.apply(incident_clear("never-seen")).await,
        DeltaOutcome::Unchanged
    );
    assert_eq!(store.revision().await, before);
}
