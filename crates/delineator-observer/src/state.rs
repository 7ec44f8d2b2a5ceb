//! Shared application state for the observer server.
//!
//! [`AppState`] wraps the monitor's [`SharedStore`] plus an optional view
//! of the stream synchronizer. Handlers only ever take read locks, so the
//! observer never holds up delta application for longer than one copy.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use delineator_core::{SharedStore, StoreChange};
use delineator_sync::{SyncHandle, SyncState, SyncStats, SyncStatsSnapshot};

/// Read-only view of a running synchronizer.
#[derive(Debug, Clone)]
pub struct SyncView {
    state: watch::Receiver<SyncState>,
    stats: Arc<SyncStats>,
}

impl SyncView {
    /// Observe the synchronizer behind `handle`.
    pub fn new(handle: &SyncHandle) -> Self {
        Self {
            state: handle.watch_state(),
            stats: handle.stats(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Current counters.
    pub fn stats(&self) -> SyncStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Shared state for the Axum application, injected via `State`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The monitor's entity store.
    pub store: SharedStore,
    /// Synchronizer view, absent when the observer runs without one.
    pub sync: Option<SyncView>,
}

impl AppState {
    /// State over `store` with no synchronizer attached.
    pub const fn new(store: SharedStore) -> Self {
        Self { store, sync: None }
    }

    /// Attach a synchronizer view.
    #[must_use]
    pub fn with_sync(mut self, sync: SyncView) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Subscribe to store change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }
}
