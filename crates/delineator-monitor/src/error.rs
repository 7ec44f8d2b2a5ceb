//! Error types for the monitor binary.

/// Top-level error for the monitor binary.
///
/// Each variant wraps one subsystem's failure so `main` can propagate
/// everything with `?`.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: delineator_core::ConfigError,
    },

    /// Upstream client setup or synchronizer shutdown failed.
    #[error("sync error: {source}")]
    Sync {
        /// The underlying sync error.
        #[from]
        source: delineator_sync::SyncError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {message}")]
    Observer {
        /// Description of the observer failure.
        message: String,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {0}")]
    Signal(std::io::Error),
}
