//! Operator command submission.
//!
//! Commands are fire-and-acknowledge: the upstream answers with a
//! [`CommandAck`] and the resulting state changes arrive later as stream
//! deltas. Nothing here touches the store.

use std::time::Duration;

use delineator_core::config::UpstreamConfig;
use delineator_types::{Command, CommandAck, DetectionSource, Direction, IncidentId, Severity};

use crate::error::SyncError;

/// HTTP client for the upstream command endpoint.
#[derive(Debug, Clone)]
pub struct CommandClient {
    client: reqwest::Client,
    url: String,
}

impl CommandClient {
    /// Build a client for the configured command endpoint.
    pub fn new(config: &UpstreamConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SyncError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: config.commands_url(),
        })
    }

    /// Validate and submit a command.
    ///
    /// A well-formed acknowledgment is returned as `Ok` even when the
    /// upstream refused the command (`ok == false`); callers inspect
    /// [`CommandAck::ok`]. Anything else is an error.
    pub async fn submit(&self, command: &Command) -> Result<CommandAck, SyncError> {
        command.validate()?;

        let response = self
            .client
            .post(&self.url)
            .json(command)
            .send()
            .await
            .map_err(|e| SyncError::Request {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_owned());

        match serde_json::from_str::<CommandAck>(&body) {
            Ok(ack) => {
                if ack.ok {
                    tracing::info!(
                        action = command.action(),
                        incident = ?ack.incident_id,
                        sent = ?ack.sent,
                        "command accepted"
                    );
                } else {
                    tracing::warn!(
                        action = command.action(),
                        error = ?ack.error,
                        "command refused"
                    );
                }
                Ok(ack)
            }
            Err(_) if !status.is_success() => Err(SyncError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(SyncError::Parse {
                url: self.url.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Declare an accident.
    pub async fn declare_accident(
        &self,
        direction: Direction,
        lane: u8,
        chainage_m: f64,
        severity: Severity,
        detected_by: DetectionSource,
    ) -> Result<CommandAck, SyncError> {
        self.submit(&Command::Accident {
            direction,
            lane,
            chainage_m,
            severity,
            detected_by,
        })
        .await
    }

    /// Clear an incident.
    pub async fn clear_incident(&self, incident_id: IncidentId) -> Result<CommandAck, SyncError> {
        self.submit(&Command::Clear { incident_id }).await
    }
}
