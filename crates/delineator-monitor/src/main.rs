//! Monitor binary for the delineator incident system.
//!
//! Wires the entity store to the upstream service and serves the observer
//! API until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `delineator.yaml` (or `$DELINEATOR_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Create the shared entity store
//! 4. Load the initial snapshot (failure is logged, startup continues)
//! 5. Start the stream synchronizer
//! 6. Start the observer API server
//! 7. Run until `Ctrl-C`, then stop the synchronizer and observer

mod error;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use delineator_core::config::LoggingConfig;
use delineator_core::{EntityStore, MonitorConfig, SharedStore, StoreChange, StoreSettings};
use delineator_observer::{AppState, ServerConfig, SyncView};
use delineator_sync::{SnapshotLoader, SseTransport, StreamSynchronizer};
use delineator_types::SystemStatus;

use crate::error::MonitorError;

#[tokio::main]
async fn main() -> Result<(), MonitorError> {
    // 1. Load configuration.
    let config_path = MonitorConfig::default_path();
    let config = MonitorConfig::load_or_default(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        path = %config_path.display(),
        upstream = %config.upstream.base_url,
        "delineator-monitor starting"
    );

    // 3. Create the shared entity store.
    let store = SharedStore::new(
        EntityStore::new(&StoreSettings::from_config(&config)),
        config.observer.change_buffer,
    );
    let status_logger = spawn_status_logger(&store);

    // 4. Load the initial snapshot before any delta is applied.
    let loader = SnapshotLoader::new(&config.upstream)?;
    match loader.load_into(&store).await {
        Ok(snapshot) => info!(
            nodes = snapshot.nodes.len(),
            incidents = snapshot.incidents.len(),
            "Initial snapshot loaded"
        ),
        Err(e) => warn!(error = %e, "Snapshot load failed, starting with an empty store"),
    }

    // 5. Start the stream synchronizer.
    let transport = SseTransport::new(&config.upstream)?;
    info!(url = transport.url(), "Starting stream synchronizer");
    let sync = StreamSynchronizer::new(transport, store.clone(), &config.sync).start();

    // 6. Start the observer API server.
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let observer = if config.observer.enabled {
        let state = Arc::new(AppState::new(store.clone()).with_sync(SyncView::new(&sync)));
        let shutdown = async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        };
        let handle = delineator_observer::spawn_observer(
            &ServerConfig::from_config(&config.observer),
            state,
            shutdown,
        )
        .await
        .map_err(|e| MonitorError::Observer {
            message: format!("{e}"),
        })?;
        info!(addr = %handle.addr, "Observer API server started");
        Some(handle)
    } else {
        info!("Observer API disabled");
        None
    };

    // 7. Run until interrupted.
    tokio::signal::ctrl_c().await.map_err(MonitorError::Signal)?;
    info!("Shutdown requested");

    sync.stop().await?;
    shutdown_tx.send_replace(true);
    if let Some(handle) = observer {
        if let Err(e) = handle.task.await {
            warn!(error = %e, "Observer task did not finish cleanly");
        }
    }
    status_logger.abort();

    let final_state = store.snapshot().await;
    info!(
        revision = final_state.revision,
        status = ?final_state.status,
        "delineator-monitor shutdown complete"
    );
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Log every system status transition.
fn spawn_status_logger(store: &SharedStore) -> JoinHandle<()> {
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        let mut last = SystemStatus::Normal;
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if let Some(status) = status_transition(last, &change) {
                        info!(
                            from = ?last,
                            to = ?status,
                            revision = change.revision,
                            "System status changed"
                        );
                        last = status;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "Status logger lagged");
                }
                Err(RecvError::Closed) => return,
            }
        }
    })
}

/// The new status, if `change` moved it away from `last`.
fn status_transition(last: SystemStatus, change: &StoreChange) -> Option<SystemStatus> {
    (change.status != last).then_some(change.status)
}
