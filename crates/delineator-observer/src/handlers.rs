//! REST endpoint handlers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/healthz` | Liveness probe |
//! | `GET` | `/api/nodes` | All nodes (`?direction=` filter) |
//! | `GET` | `/api/nodes/{id}` | Single node |
//! | `GET` | `/api/incidents` | Incidents, newest first (`?status=` filter) |
//! | `GET` | `/api/status` | System status, revision, sync state |
//! | `GET` | `/api/events` | Operator event log (`?limit=`) |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use delineator_core::geometry::{IlluminationSummary, illumination_summary};
use delineator_sync::{SyncState, SyncStatsSnapshot};
use delineator_types::{Direction, Event, Incident, IncidentStatus, Node, SystemStatus};

use crate::error::ObserverError;
use crate::state::AppState;

/// Default and maximum page size for `GET /api/events`.
pub const DEFAULT_EVENT_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/nodes`.
#[derive(Debug, Deserialize)]
pub struct NodesQuery {
    /// Only nodes on this carriageway.
    pub direction: Option<Direction>,
}

/// Query parameters for `GET /api/incidents`.
#[derive(Debug, Deserialize)]
pub struct IncidentsQuery {
    /// `active` | `pending` | `cleared` | `all` (default `all`).
    pub status: Option<String>,
}

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// Body of `GET /api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Aggregated system status.
    pub status: SystemStatus,
    /// Store revision the answer was read at.
    pub revision: u64,
    /// Number of known nodes.
    pub nodes: usize,
    /// Number of active incidents.
    pub active_incidents: usize,
    /// Lit nodes by color.
    pub illumination: IlluminationSummary,
    /// Stream connection state, when a synchronizer is attached.
    pub sync: Option<SyncState>,
    /// Synchronizer counters, when a synchronizer is attached.
    pub sync_stats: Option<SyncStatsSnapshot>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// List nodes ordered by id.
pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NodesQuery>,
) -> Json<Vec<Node>> {
    let store = state.store.read().await;
    let nodes = store
        .nodes()
        .filter(|node| query.direction.is_none_or(|d| node.direction == d))
        .cloned()
        .collect();
    Json(nodes)
}

/// Single node by id.
pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Node>, ObserverError> {
    let store = state.store.read().await;
    store
        .node(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound(format!("node {id}")))
}

/// List incidents, newest first.
pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IncidentsQuery>,
) -> Result<Json<Vec<Incident>>, ObserverError> {
    let filter = match query.status.as_deref() {
        None | Some("all") => None,
        Some("active") => Some(IncidentStatus::Active),
        Some("pending") => Some(IncidentStatus::Pending),
        Some("cleared") => Some(IncidentStatus::Cleared),
        Some(other) => {
            return Err(ObserverError::InvalidQuery(format!(
                "unknown incident status '{other}', expected active, pending, cleared or all"
            )));
        }
    };

    let store = state.store.read().await;
    let incidents = store
        .incidents()
        .into_iter()
        .filter(|incident| filter.is_none_or(|status| incident.status == status))
        .cloned()
        .collect();
    Ok(Json(incidents))
}

/// Aggregated status plus synchronizer diagnostics.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let store = state.store.read().await;
    let body = StatusResponse {
        status: store.status(),
        revision: store.revision(),
        nodes: store.node_count(),
        active_incidents: store.active_incidents().len(),
        illumination: illumination_summary(store.nodes()),
        sync: state.sync.as_ref().map(crate::state::SyncView::state),
        sync_stats: state.sync.as_ref().map(crate::state::SyncView::stats),
    };
    Json(body)
}

/// Most recent operator events, newest first.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .min(DEFAULT_EVENT_LIMIT);
    let store = state.store.read().await;
    Json(store.events().recent(limit))
}
