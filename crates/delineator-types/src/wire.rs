//! Upstream wire messages: the stream delta envelope and incident commands.
//!
//! Every stream message is a JSON text of the form
//! `{"type": <discriminator>, "payload": <object>}`. Decoding is lenient
//! about the discriminator (unknown types are surfaced, not rejected) and
//! strict about payloads (a malformed payload is a decode error for that
//! one message only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;

use crate::enums::{DetectionSource, Direction, Severity};
use crate::ids::{IncidentId, NodeId};
use crate::structs::{Incident, NodeUpdate};

// ---------------------------------------------------------------------------
// Delta envelope
// ---------------------------------------------------------------------------

/// Payload of an `incident_clear` delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IncidentClear {
    /// Incident being cleared.
    pub id: IncidentId,
    /// Upstream clock at the time of the clear, when provided.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub server_time: Option<DateTime<Utc>>,
}

/// Payload of a `snapshot` delta, sent by the upstream on every connect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StreamSnapshot {
    /// Upstream clock when the snapshot was taken.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub server_time: Option<DateTime<Utc>>,
    /// Every incident the upstream knows about.
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

/// A typed change event received from the upstream stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// An incident was created or re-announced.
    IncidentNew(Incident),
    /// An incident was cleared.
    IncidentClear(IncidentClear),
    /// Partial node fields changed.
    NodeUpdate(NodeUpdate),
    /// Full incident list pushed on connect.
    Snapshot(StreamSnapshot),
    /// Keep-alive (`heartbeat`, `keepalive`, `ping`). Carries no state.
    KeepAlive,
    /// A discriminator this monitor does not understand.
    Unrecognized(String),
}

/// Error decoding one stream message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The text is not a `{"type": ..., "payload": ...}` object.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The envelope is fine but its payload does not match its type.
    #[error("malformed {kind} payload: {source}")]
    Payload {
        /// The envelope discriminator.
        kind: &'static str,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

fn payload<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    value: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Payload { kind, source })
}

impl Delta {
    /// Decode one stream message.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(DecodeError::Envelope)?;
        let delta = match raw.kind.as_str() {
            "incident_new" => Self::IncidentNew(payload("incident_new", raw.payload)?),
            "incident_clear" => Self::IncidentClear(payload("incident_clear", raw.payload)?),
            "node_update" => Self::NodeUpdate(payload("node_update", raw.payload)?),
            "snapshot" => Self::Snapshot(payload("snapshot", raw.payload)?),
            "heartbeat" | "keepalive" | "ping" => Self::KeepAlive,
            _ => Self::Unrecognized(raw.kind),
        };
        Ok(delta)
    }

    /// The envelope discriminator.
    pub fn kind(&self) -> &str {
        match self {
            Self::IncidentNew(_) => "incident_new",
            Self::IncidentClear(_) => "incident_clear",
            Self::NodeUpdate(_) => "node_update",
            Self::Snapshot(_) => "snapshot",
            Self::KeepAlive => "heartbeat",
            Self::Unrecognized(kind) => kind.as_str(),
        }
    }

    /// Whether applying this delta can change store state.
    pub const fn is_stateful(&self) -> bool {
        !matches!(self, Self::KeepAlive | Self::Unrecognized(_))
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Serializes a [`Direction`] using the gateway's carriageway labels.
mod carriageway {
    use super::{Deserialize, Deserializer, Direction, Serializer};

    pub fn serialize<S: Serializer>(direction: &Direction, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(direction.carriageway())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Direction, D::Error> {
        let label = String::deserialize(d)?;
        Ok(Direction::from_carriageway(&label))
    }
}

/// An operator command submitted to the upstream command endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Command {
    /// Declare an accident at a chainage.
    Accident {
        /// Carriageway, sent as `inbound` / `outbound`.
        #[serde(with = "carriageway")]
        #[ts(type = "\"inbound\" | \"outbound\"")]
        direction: Direction,
        /// Lane ordinal, 1 = innermost.
        lane: u8,
        /// Chainage in meters.
        chainage_m: f64,
        /// Danger level.
        #[ts(type = "1 | 2 | 3")]
        severity: Severity,
        /// How the accident was detected.
        #[serde(rename = "detectedBy", default)]
        detected_by: DetectionSource,
    },
    /// Clear a previously declared incident.
    Clear {
        /// Incident to clear.
        incident_id: IncidentId,
    },
}

/// Reason a command was refused before submission.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidCommand {
    /// Lanes are numbered from 1.
    #[error("lane must be at least 1, got {0}")]
    Lane(u8),
    /// Chainage must be a finite, non-negative distance.
    #[error("chainage must be finite and non-negative, got {0}")]
    Chainage(f64),
    /// Clear commands need an incident id.
    #[error("incident id must not be empty")]
    EmptyIncidentId,
}

impl Command {
    /// Check the command against the gateway's input rules.
    pub fn validate(&self) -> Result<(), InvalidCommand> {
        match self {
            Self::Accident {
                lane, chainage_m, ..
            } => {
                if *lane < 1 {
                    return Err(InvalidCommand::Lane(*lane));
                }
                if !chainage_m.is_finite() || *chainage_m < 0.0 {
                    return Err(InvalidCommand::Chainage(*chainage_m));
                }
                Ok(())
            }
            Self::Clear { incident_id } => {
                if incident_id.as_str().trim().is_empty() {
                    Err(InvalidCommand::EmptyIncidentId)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// The `action` discriminator.
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Accident { .. } => "accident",
            Self::Clear { .. } => "clear",
        }
    }
}

/// Acknowledgment returned by the command endpoint.
///
/// The effects of an accepted command arrive later as stream deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CommandAck {
    /// Whether the upstream accepted the command.
    pub ok: bool,
    /// Identifier assigned to a newly declared incident.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub incident_id: Option<IncidentId>,
    /// Node the field gateway seeded the warning pattern from.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub seed_node: Option<NodeId>,
    /// Whether the field gateway received the command.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub sent: Option<bool>,
    /// Gateway delivery detail (usually an error description).
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub detail: Option<String>,
    /// Rejection reason when `ok` is false.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::enums::IncidentStatus;

    #[test]
    fn decodes_incident_new() {
        let text = r#"{"type":"incident_new","payload":{
            "id":"a3f9c2d1","location":"100m Mark","position":100,
            "direction":"north","lane":1,"severity":1,"status":"active",
            "startTime":"2024-05-01T10:00:00Z","detectedBy":"cctv"}}"#;
        if let Delta::IncidentNew(incident) = Delta::decode(text).unwrap() {
            assert_eq!(incident.id.as_str(), "a3f9c2d1");
            assert_eq!(incident.status, IncidentStatus::Active);
            assert_eq!(incident.detected_by, DetectionSource::Cctv);
        } else {
            panic!("Expected incident_new");
        }
    }

    #[test]
    fn decodes_clear_with_server_time() {
        let text = r#"{"type":"incident_clear","payload":{"id":"x","server_time":"2024-05-01T10:00:00Z"}}"#;
        let delta = Delta::decode(text).unwrap();
        assert!(matches!(delta, Delta::IncidentClear(ref c) if c.server_time.is_some()));
        assert_eq!(delta.kind(), "incident_clear");
    }

    #[test]
    fn heartbeat_without_payload_is_keep_alive() {
        let delta = Delta::decode(r#"{"type":"heartbeat","ts":"2024-05-01T10:00:00Z"}"#).unwrap();
        assert_eq!(delta, Delta::KeepAlive);
        assert!(!delta.is_stateful());
    }

    #[test]
    fn unknown_type_is_surfaced_not_rejected() {
        let delta = Delta::decode(r#"{"type":"weather","payload":{}}"#).unwrap();
        assert_eq!(delta, Delta::Unrecognized(String::from("weather")));
    }

    #[test]
    fn malformed_messages_are_errors() {
        assert!(matches!(
            Delta::decode("not json"),
            Err(DecodeError::Envelope(_))
        ));
        assert!(matches!(
            Delta::decode(r#"{"type":"node_update","payload":{"lane":2}}"#),
            Err(DecodeError::Payload {
                kind: "node_update",
                ..
            })
        ));
    }

    #[test]
    fn snapshot_ignores_system_field() {
        let text = r#"{"type":"snapshot","payload":{"server_time":"2024-05-01T10:00:00Z",
            "system":{"status":"normal"},"incidents":[]}}"#;
        let delta = Delta::decode(text).unwrap();
        assert!(matches!(delta, Delta::Snapshot(ref s) if s.incidents.is_empty()));
    }

    #[test]
    fn accident_command_uses_gateway_labels() {
        let cmd = Command::Accident {
            direction: Direction::South,
            lane: 2,
            chainage_m: 250.0,
            severity: Severity::Critical,
            detected_by: DetectionSource::Manual,
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "action": "accident",
                "direction": "outbound",
                "lane": 2,
                "chainage_m": 250.0,
                "severity": 1,
                "detectedBy": "manual"
            })
        );
        assert_eq!(cmd.action(), "accident");
    }

    #[test]
    fn clear_command_shape() {
        let cmd = Command::Clear {
            incident_id: IncidentId::from("a3f9c2d1"),
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"action": "clear", "incident_id": "a3f9c2d1"})
        );
    }

    #[test]
    fn command_validation() {
        let accident = |lane, chainage_m| Command::Accident {
            direction: Direction::North,
            lane,
            chainage_m,
            severity: Severity::Major,
            detected_by: DetectionSource::Manual,
        };
        assert!(accident(1, 0.0).validate().is_ok());
        assert_eq!(accident(0, 10.0).validate(), Err(InvalidCommand::Lane(0)));
        assert!(matches!(
            accident(1, -1.0).validate(),
            Err(InvalidCommand::Chainage(_))
        ));
        assert!(accident(1, f64::INFINITY).validate().is_err());
        let clear = Command::Clear {
            incident_id: IncidentId::from(" "),
        };
        assert_eq!(clear.validate(), Err(InvalidCommand::EmptyIncidentId));
    }

    #[test]
    fn ack_parses_gateway_response() {
        let ack: CommandAck = serde_json::from_str(
            r#"{"ok":true,"incident_id":"a3f9c2d1","seed_node":"O05","sent":false,"detail":"SerialException()"}"#,
        )
        .unwrap();
        assert!(ack.ok);
        assert_eq!(ack.seed_node, Some(NodeId::from("O05")));
        assert_eq!(ack.sent, Some(false));

        let rejected: CommandAck =
            serde_json::from_str(r#"{"ok":false,"error":"bad_command"}"#).unwrap();
        assert_eq!(rejected.error.as_deref(), Some("bad_command"));
    }
}
