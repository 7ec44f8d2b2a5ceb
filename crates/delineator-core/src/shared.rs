//! Concurrent handle to the [`EntityStore`].
//!
//! [`SharedStore`] wraps the store in a [`tokio::sync::RwLock`] and pairs it
//! with a broadcast channel of [`StoreChange`] notifications. Every
//! mutation (a delta plus the recomputation it triggers) runs inside one
//! write-lock critical section, so readers never observe a partially
//! applied delta. A notification is published after each mutation that
//! actually changed state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard, broadcast};

use delineator_types::{Delta, Incident, Node, SystemStatus};

use crate::store::{DeltaOutcome, EntityStore, StoreSnapshot};

/// Default capacity of the change notification channel.
///
/// A subscriber that falls behind by more than this many notifications
/// receives [`broadcast::error::RecvError::Lagged`] and skips ahead.
pub const DEFAULT_CHANGE_BUFFER: usize = 256;

/// What kind of mutation produced a [`StoreChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Bulk load from the snapshot endpoint.
    Seed,
    /// `incident_new` delta.
    IncidentNew,
    /// `incident_clear` delta.
    IncidentClear,
    /// `node_update` delta.
    NodeUpdate,
    /// `snapshot` delta pushed on connect.
    StreamSnapshot,
    /// Any other mutation made through [`SharedStore::mutate`].
    Other,
}

impl ChangeKind {
    /// The change kind a delta maps to.
    pub const fn of(delta: &Delta) -> Self {
        match delta {
            Delta::IncidentNew(_) => Self::IncidentNew,
            Delta::IncidentClear(_) => Self::IncidentClear,
            Delta::NodeUpdate(_) => Self::NodeUpdate,
            Delta::Snapshot(_) => Self::StreamSnapshot,
            Delta::KeepAlive | Delta::Unrecognized(_) => Self::Other,
        }
    }
}

/// Notification published after every effective store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreChange {
    /// Store revision after the mutation.
    pub revision: u64,
    /// What changed.
    pub kind: ChangeKind,
    /// System status after the mutation.
    pub status: SystemStatus,
}

/// Cloneable, lock-protected handle to the entity store.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<EntityStore>>,
    tx: broadcast::Sender<StoreChange>,
}

impl SharedStore {
    /// Wrap a store. `buffer` is the notification channel capacity.
    pub fn new(store: EntityStore, buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            inner: Arc::new(RwLock::new(store)),
            tx,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }

    /// Shared read access.
    pub async fn read(&self) -> RwLockReadGuard<'_, EntityStore> {
        self.inner.read().await
    }

    /// Owned copy of the current state.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.inner.read().await.snapshot()
    }

    /// Current revision.
    pub async fn revision(&self) -> u64 {
        self.inner.read().await.revision()
    }

    /// Apply one stream delta atomically and notify subscribers if the
    /// store changed.
    pub async fn apply(&self, delta: Delta) -> DeltaOutcome {
        let kind = ChangeKind::of(&delta);
        self.mutate(kind, |store| store.apply_delta(delta)).await
    }

    /// Bulk-load nodes and incidents.
    pub async fn seed(&self, nodes: Vec<Node>, incidents: Vec<Incident>) {
        self.mutate(ChangeKind::Seed, |store| store.seed(nodes, incidents))
            .await;
    }

    /// Run `f` under the write lock. Subscribers are notified if the
    /// revision moved.
    pub async fn mutate<F, R>(&self, kind: ChangeKind, f: F) -> R
    where
        F: FnOnce(&mut EntityStore) -> R,
    {
        let (result, change) = {
            let mut store = self.inner.write().await;
            let before = store.revision();
            let result = f(&mut *store);
            let change = (store.revision() != before).then(|| StoreChange {
                revision: store.revision(),
                kind,
                status: store.status(),
            });
            (result, change)
        };
        if let Some(change) = change {
            self.publish(change);
        }
        result
    }

    /// Push a notification to all subscribers. Returns how many received
    /// it; zero subscribers is not an error.
    pub fn publish(&self, change: StoreChange) -> usize {
        self.tx.send(change).unwrap_or(0)
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new(EntityStore::default(), DEFAULT_CHANGE_BUFFER)
    }
}
