//! Axum router construction for the observer API.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the observer router: the REST endpoints listed in
/// [`handlers`] plus `GET /ws/updates`.
///
/// CORS allows any origin so a display served from elsewhere can poll it.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/ws/updates", get(ws::ws_updates))
        .route("/api/nodes", get(handlers::list_nodes))
        .route("/api/nodes/{id}", get(handlers::get_node))
        .route("/api/incidents", get(handlers::list_incidents))
        .route("/api/status", get(handlers::get_status))
        .route("/api/events", get(handlers::list_events))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
