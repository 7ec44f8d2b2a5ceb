//! Error types for the observer API.
//!
//! [`ObserverError`] converts into an HTTP response with a JSON body of
//! the form `{"error": "...", "status": 404}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors that can occur in the observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested node or incident does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A query parameter had an unsupported value.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::InvalidQuery(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
