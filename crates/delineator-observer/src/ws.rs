//! `WebSocket` stream of store change notifications.
//!
//! Clients connect to `GET /ws/updates` and receive one JSON-encoded
//! [`StoreChange`] per effective store mutation. A client that falls
//! behind the broadcast buffer is sent a single catch-up notice carrying
//! the current revision and status, then continues from there.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use delineator_core::{ChangeKind, StoreChange};

use crate::state::AppState;

/// Upgrade to a `WebSocket` and start streaming changes.
///
/// # Route
///
/// `GET /ws/updates`
pub async fn ws_updates(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn send_change(socket: &mut WebSocket, change: &StoreChange) -> bool {
    let json = match serde_json::to_string(change) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize store change: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    let mut rx = state.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                let change = match result {
                    Ok(change) => change,
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, sending catch-up");
                        let store = state.store.read().await;
                        StoreChange {
                            revision: store.revision(),
                            kind: ChangeKind::Other,
                            status: store.status(),
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Change channel closed, shutting down WebSocket");
                        return;
                    }
                };
                if !send_change(&mut socket, &change).await {
                    debug!("WebSocket client disconnected (send failed)");
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
