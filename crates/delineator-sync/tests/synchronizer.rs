//! Reconnect and dispatch behavior of the stream synchronizer.
//!
//! A scripted transport stands in for the network: each `connect` call
//! pops the next step of a script and reports the attempt time, so the
//! reconnect schedule can be checked exactly on Tokio's paused clock.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use delineator_core::SharedStore;
use delineator_core::config::SyncConfig;
use delineator_sync::{
    Backoff, MessageStream, StreamSynchronizer, StreamTransport, SyncError, SyncState,
};
use delineator_types::{
    Direction, EventKind, EventSeverity, LedColor, Node, NodeHealth, NodeId, SignalState,
};

enum Step {
    /// The connect attempt fails.
    Refuse,
    /// Deliver the messages, then stay open.
    Serve(Vec<String>),
    /// Deliver the messages, then the upstream closes the stream.
    ServeThenClose(Vec<String>),
    /// Deliver the messages, then the connection breaks.
    ServeThenFail(Vec<String>),
}

struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    attempts: mpsc::UnboundedSender<Instant>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> (Self, mpsc::UnboundedReceiver<Instant>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            steps: Mutex::new(steps.into()),
            attempts: tx,
        };
        (transport, rx)
    }
}

fn messages(items: Vec<String>) -> stream::Iter<std::vec::IntoIter<Result<String, SyncError>>> {
    let items: Vec<Result<String, SyncError>> = items.into_iter().map(Ok).collect();
    stream::iter(items)
}

impl StreamTransport for ScriptedTransport {
    async fn connect(&self) -> Result<MessageStream, SyncError> {
        let _ = self.attempts.send(Instant::now());
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Refuse);
        match step {
            Step::Refuse => Err(SyncError::Request {
                url: String::from("scripted://stream"),
                reason: String::from("connection refused"),
            }),
            Step::Serve(items) => Ok(messages(items).chain(stream::pending()).boxed()),
            Step::ServeThenClose(items) => Ok(messages(items).boxed()),
            Step::ServeThenFail(items) => Ok(messages(items)
                .chain(stream::once(async {
                    Err(SyncError::Stream(String::from("connection reset")))
                }))
                .boxed()),
        }
    }
}

fn incident_new(id: &str, position: f64) -> String {
    serde_json::json!({
        "type": "incident_new",
        "payload": {
            "id": id,
            "location": format!("{position}m Mark"),
            "position": position,
            "direction": "north",
            "lane": 1,
            "severity": 1,
            "status": "active",
            "startTime": Utc::now().to_rfc3339(),
            "detectedBy": "cctv"
        }
    })
    .to_string()
}

fn node(id: &str, position: f64) -> Node {
    Node {
        id: NodeId::from(id),
        direction: Direction::North,
        lane: 1,
        position,
        health: NodeHealth::Ok,
        battery: 100.0,
        signal: SignalState::OFF,
        last_heartbeat: Utc::now(),
    }
}

async fn collect_attempts(rx: &mut mpsc::UnboundedReceiver<Instant>, count: usize) -> Vec<Instant> {
    let mut attempts = Vec::with_capacity(count);
    for _ in 0..count {
        attempts.push(rx.recv().await.unwrap());
    }
    attempts
}

fn gaps_ms(attempts: &[Instant]) -> Vec<u128> {
    attempts
        .iter()
        .zip(attempts.iter().skip(1))
        .map(|(a, b)| b.duration_since(*a).as_millis())
        .collect()
}

/// Let the synchronizer task run until `done` holds (bounded).
async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn failed_connects_back_off_exponentially_then_cap() {
    let (transport, mut attempts) = ScriptedTransport::new(Vec::new());
    let handle =
        StreamSynchronizer::new(transport, SharedStore::default(), &SyncConfig::default()).start();

    let times = collect_attempts(&mut attempts, 8).await;
    assert_eq!(
        gaps_ms(&times),
        vec![1000, 2000, 4000, 8000, 16_000, 32_000, 32_000]
    );
    assert_eq!(handle.stats().snapshot().failed_connects, 8);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn custom_backoff_replaces_the_configured_schedule() {
    let (transport, mut attempts) = ScriptedTransport::new(Vec::new());
    let handle = StreamSynchronizer::new(transport, SharedStore::default(), &SyncConfig::default())
        .with_backoff(Backoff::new(Duration::from_millis(100), 2))
        .start();

    let times = collect_attempts(&mut attempts, 4).await;
    assert_eq!(gaps_ms(&times), vec![200, 400, 400]);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn connection_changes_are_logged_as_system_events() {
    let (transport, mut attempts) = ScriptedTransport::new(vec![
        Step::ServeThenFail(Vec::new()),
        Step::Serve(Vec::new()),
    ]);
    let store = SharedStore::default();
    let handle = StreamSynchronizer::new(transport, store.clone(), &SyncConfig::default()).start();

    collect_attempts(&mut attempts, 2).await;
    assert!(handle.wait_for(SyncState::Streaming).await);
    handle.stop().await.unwrap();

    let guard = store.read().await;
    let system: Vec<_> = guard
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::System)
        .collect();
    assert_eq!(system.len(), 3);
    let connected = system
        .iter()
        .filter(|e| e.message == "Upstream stream connected" && e.severity == EventSeverity::Info)
        .count();
    assert_eq!(connected, 2);
    let lost = system
        .iter()
        .find(|e| e.severity == EventSeverity::Warning)
        .unwrap();
    assert!(lost.message.starts_with("Upstream stream lost"));
    assert!(lost.message.contains("connection reset"));
    assert_eq!(store.revision().await, 0);
}

#[tokio::test(start_paused = true)]
async fn successful_connect_resets_the_retry_counter() {
    let (transport, mut attempts) = ScriptedTransport::new(vec![
        Step::Refuse,
        Step::Refuse,
        Step::ServeThenClose(Vec::new()),
        Step::Refuse,
    ]);
    let handle =
        StreamSynchronizer::new(transport, SharedStore::default(), &SyncConfig::default()).start();

    let times = collect_attempts(&mut attempts, 5).await;
    assert_eq!(gaps_ms(&times), vec![1000, 2000, 1000, 2000]);

    let stats = handle.stats().snapshot();
    assert_eq!(stats.connects, 1);
    assert_eq!(stats.disconnects, 1);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn streamed_deltas_reach_the_store() {
    let store = SharedStore::default();
    store.seed(vec![node("N-150", 150.0)], Vec::new()).await;
    let mut changes = store.subscribe();

    let (transport, _attempts) = ScriptedTransport::new(vec![Step::Serve(vec![
        String::from(r#"{"type":"heartbeat"}"#),
        String::from("not json at all"),
        String::from(r#"{"type":"camera_frame","payload":{}}"#),
        incident_new("I-1", 100.0),
    ])]);
    let handle = StreamSynchronizer::new(transport, store.clone(), &SyncConfig::default()).start();

    let change = changes.recv().await.unwrap();
    assert_eq!(change.kind, delineator_core::ChangeKind::IncidentNew);

    let stats = handle.stats();
    settle(|| stats.snapshot().applied == 1).await;
    let snap = stats.snapshot();
    assert_eq!(snap.applied, 1);
    assert_eq!(snap.discarded, 1);
    assert_eq!(snap.ignored, 2);
    assert_eq!(handle.state(), SyncState::Streaming);

    let guard = store.read().await;
    let lit = guard.node("N-150").unwrap();
    assert_eq!(lit.signal.color(), LedColor::Red);
    assert_eq!(guard.active_incidents().len(), 1);
    drop(guard);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stream_failure_reconnects_after_one_unit() {
    let (transport, mut attempts) = ScriptedTransport::new(vec![
        Step::ServeThenFail(vec![incident_new("I-1", 100.0)]),
        Step::Serve(Vec::new()),
    ]);
    let store = SharedStore::default();
    let handle = StreamSynchronizer::new(transport, store.clone(), &SyncConfig::default()).start();

    let times = collect_attempts(&mut attempts, 2).await;
    assert_eq!(gaps_ms(&times), vec![1000]);
    assert!(handle.wait_for(SyncState::Streaming).await);

    let stats = handle.stats().snapshot();
    assert_eq!(stats.connects, 2);
    assert_eq!(stats.disconnects, 1);
    assert_eq!(stats.applied, 1);
    assert!(store.read().await.incident("I-1").is_some());
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn idle_watchdog_drops_a_silent_stream() {
    let config = SyncConfig {
        idle_timeout_ms: 5000,
        ..SyncConfig::default()
    };
    let (transport, mut attempts) =
        ScriptedTransport::new(vec![Step::Serve(Vec::new()), Step::Serve(Vec::new())]);
    let handle = StreamSynchronizer::new(transport, SharedStore::default(), &config).start();

    let times = collect_attempts(&mut attempts, 2).await;
    assert_eq!(gaps_ms(&times), vec![6000]);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_a_pending_backoff() {
    let (transport, mut attempts) = ScriptedTransport::new(Vec::new());
    let handle =
        StreamSynchronizer::new(transport, SharedStore::default(), &SyncConfig::default()).start();
    let state = handle.watch_state();

    collect_attempts(&mut attempts, 1).await;
    assert!(handle.wait_for(SyncState::Disconnected).await);

    let before = Instant::now();
    handle.stop().await.unwrap();
    assert!(before.elapsed() < Duration::from_millis(1));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(attempts.try_recv().is_err());
    assert_eq!(*state.borrow(), SyncState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn stop_closes_an_open_stream() {
    let (transport, mut attempts) = ScriptedTransport::new(vec![Step::Serve(Vec::new())]);
    let handle =
        StreamSynchronizer::new(transport, SharedStore::default(), &SyncConfig::default()).start();
    let state = handle.watch_state();

    assert!(handle.wait_for(SyncState::Streaming).await);
    handle.stop().await.unwrap();
    assert_eq!(*state.borrow(), SyncState::Disconnected);

    collect_attempts(&mut attempts, 1).await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(attempts.try_recv().is_err());
}
