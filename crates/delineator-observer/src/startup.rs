//! Background startup for embedding the observer in the monitor binary.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// A running observer server.
#[derive(Debug)]
pub struct ObserverHandle {
    /// Address actually bound (resolves port 0).
    pub addr: SocketAddr,
    /// The serving task. Resolves after the shutdown future fires.
    pub task: JoinHandle<()>,
}

/// Bind the observer and serve it on a background Tokio task.
///
/// Binding happens before this returns, so an unusable address is
/// reported to the caller rather than only logged. Serve errors after
/// that point are logged from the task.
pub async fn spawn_observer<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<ObserverHandle, StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = server::bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

    let task = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(%addr, "Observer server spawned on background task");

    Ok(ObserverHandle { addr, task })
}
