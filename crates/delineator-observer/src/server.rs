//! Observer HTTP server lifecycle.
//!
//! [`bind`] and [`serve`] are split so callers can surface bind errors
//! before handing the server off to a background task.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use delineator_core::config::ObserverConfig;

use crate::router::build_router;
use crate::state::AppState;

/// Listen address of the observer server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port; 0 picks an ephemeral port.
    pub port: u16,
}

impl ServerConfig {
    /// Take the listen address from the `observer` config section.
    pub fn from_config(config: &ObserverConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }

    /// Parse into a socket address.
    pub fn addr(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ServerError::Bind(format!("invalid address {}:{}: {e}", self.host, self.port)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config(&ObserverConfig::default())
    }
}

/// Bind the listener.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr = config.addr()?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))
}

/// Serve the observer API on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Serve(format!("no local address: {e}")))?;
    info!(%addr, "Observer server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!("Observer server stopped");
    Ok(())
}

/// Errors that can occur when starting or running the observer server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
