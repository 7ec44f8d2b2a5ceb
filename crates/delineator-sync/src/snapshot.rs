//! Initial state load over HTTP.
//!
//! The monitor fetches the full node and incident lists once at startup,
//! seeds the store with them, and only then starts the stream synchronizer.

use std::time::Duration;

use serde::de::DeserializeOwned;

use delineator_core::SharedStore;
use delineator_core::config::UpstreamConfig;
use delineator_types::{Incident, Node};

use crate::error::SyncError;

/// Node and incident lists as returned by the upstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Every known node.
    pub nodes: Vec<Node>,
    /// Every known incident.
    pub incidents: Vec<Incident>,
}

/// Fetches a [`Snapshot`] from the upstream REST endpoints.
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    client: reqwest::Client,
    nodes_url: String,
    incidents_url: String,
}

impl SnapshotLoader {
    /// Build a loader for the configured endpoints. Each request is bounded
    /// by `request_timeout_ms`.
    pub fn new(config: &UpstreamConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SyncError::Client(e.to_string()))?;
        Ok(Self {
            client,
            nodes_url: config.nodes_url(),
            incidents_url: config.incidents_url(),
        })
    }

    /// Fetch both lists concurrently.
    pub async fn fetch(&self) -> Result<Snapshot, SyncError> {
        let (nodes, incidents) = tokio::try_join!(
            self.get_json::<Vec<Node>>(&self.nodes_url),
            self.get_json::<Vec<Incident>>(&self.incidents_url),
        )?;
        tracing::info!(
            nodes = nodes.len(),
            incidents = incidents.len(),
            "snapshot fetched"
        );
        Ok(Snapshot { nodes, incidents })
    }

    /// Fetch and seed `store`. Returns what was loaded.
    pub async fn load_into(&self, store: &SharedStore) -> Result<Snapshot, SyncError> {
        let snapshot = self.fetch().await?;
        store
            .seed(snapshot.nodes.clone(), snapshot.incidents.clone())
            .await;
        Ok(snapshot)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SyncError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Request {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(SyncError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(|e| SyncError::Parse {
            url: url.to_owned(),
            reason: e.to_string(),
        })
    }
}
