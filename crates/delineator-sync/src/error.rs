//! Error types for upstream communication.
//!
//! Transport failures never escape the synchronizer loop: they end the
//! current connection and trigger a reconnect. They surface to callers only
//! from one-shot requests (snapshot fetch, command submission) and from
//! [`SyncHandle::stop`](crate::synchronizer::SyncHandle::stop).

use delineator_types::InvalidCommand;

/// Errors that can occur while talking to the upstream service.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Building the HTTP client failed.
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {reason}")]
    Request {
        /// Target URL.
        url: String,
        /// Underlying error description.
        reason: String,
    },

    /// The upstream answered with a non-success status.
    #[error("{url} returned {status}: {body}")]
    Status {
        /// Target URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("response from {url} could not be parsed: {reason}")]
    Parse {
        /// Target URL.
        url: String,
        /// Underlying error description.
        reason: String,
    },

    /// An open event stream failed mid-flight.
    #[error("event stream error: {0}")]
    Stream(String),

    /// A command failed local validation and was not sent.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] InvalidCommand),

    /// The synchronizer task panicked or was cancelled.
    #[error("synchronizer task failed: {0}")]
    Task(String),
}
