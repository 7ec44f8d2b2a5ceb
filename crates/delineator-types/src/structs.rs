//! Core entity structs: nodes, incidents, signal state, and the operator
//! event log entry.
//!
//! Wire format is camelCase JSON as produced by the upstream API. Unknown
//! fields are ignored so the upstream can grow its payloads freely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use crate::enums::{
    DetectionSource, Direction, EventKind, EventSeverity, IncidentStatus, LedColor, NodeHealth,
    Severity,
};
use crate::ids::{EventId, IncidentId, NodeId};

// ---------------------------------------------------------------------------
// SignalState
// ---------------------------------------------------------------------------

/// Error returned when a lit signal is given an unusable blink frequency.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("lit signal {color:?} needs a positive finite blink frequency, got {blink_hz}")]
pub struct InvalidSignal {
    /// The requested color.
    pub color: LedColor,
    /// The rejected frequency.
    pub blink_hz: f64,
}

/// A node's derived warning-light state.
///
/// The frequency is zero exactly when the color is [`LedColor::Off`].
/// Serialized flattened into the node as `ledColor` / `blinkHz`.
/// Deserialization goes through [`SignalState::new`], so a lit color with
/// a zero frequency is rejected and a dark color drops its frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SignalState {
    #[serde(rename = "ledColor")]
    color: LedColor,
    blink_hz: f64,
}

impl SignalState {
    /// The dark state.
    pub const OFF: Self = Self {
        color: LedColor::Off,
        blink_hz: 0.0,
    };

    /// Build a signal state.
    ///
    /// [`LedColor::Off`] always yields [`SignalState::OFF`] regardless of
    /// the frequency given. A lit color requires a positive finite
    /// frequency.
    pub fn new(color: LedColor, blink_hz: f64) -> Result<Self, InvalidSignal> {
        if !color.is_lit() {
            return Ok(Self::OFF);
        }
        if blink_hz.is_finite() && blink_hz > 0.0 {
            Ok(Self { color, blink_hz })
        } else {
            Err(InvalidSignal { color, blink_hz })
        }
    }

    /// Light color.
    pub const fn color(&self) -> LedColor {
        self.color
    }

    /// Blink frequency in hertz.
    pub const fn blink_hz(&self) -> f64 {
        self.blink_hz
    }

    /// Whether the light is on.
    pub const fn is_lit(&self) -> bool {
        self.color.is_lit()
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::OFF
    }
}

#[derive(Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawSignal {
    #[serde(rename = "ledColor")]
    color: LedColor,
    blink_hz: f64,
}

impl Default for RawSignal {
    fn default() -> Self {
        Self {
            color: LedColor::Off,
            blink_hz: 0.0,
        }
    }
}

impl<'de> Deserialize<'de> for SignalState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawSignal::deserialize(deserializer)?;
        Self::new(raw.color, raw.blink_hz).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

const fn default_health() -> NodeHealth {
    NodeHealth::Ok
}

const fn full_battery() -> f64 {
    100.0
}

/// A fixed delineator marker along one carriageway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Stable identifier.
    #[serde(alias = "node_id")]
    pub id: NodeId,
    /// Carriageway the node stands on.
    pub direction: Direction,
    /// Lane ordinal, 1 = innermost.
    pub lane: u8,
    /// Chainage in meters along the shared axis.
    #[serde(alias = "chainage_m")]
    pub position: f64,
    /// Health from the last heartbeat.
    #[serde(default = "default_health")]
    pub health: NodeHealth,
    /// Battery charge in percent (0-100).
    #[serde(default = "full_battery")]
    pub battery: f64,
    /// Derived warning-light state.
    #[serde(flatten)]
    pub signal: SignalState,
    /// Absolute instant of the last heartbeat. Topology records without
    /// one are stamped with the time they were parsed.
    #[serde(default = "Utc::now")]
    pub last_heartbeat: DateTime<Utc>,
}

/// A partial node record carried by a `node_update` delta.
///
/// Only `id` is required. Signal fields on the wire are ignored: the
/// signal state is derived from incident geometry, never taken as input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    /// Node being updated.
    pub id: NodeId,
    /// New carriageway.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub direction: Option<Direction>,
    /// New lane ordinal.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub lane: Option<u8>,
    /// New chainage.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub position: Option<f64>,
    /// New health.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub health: Option<NodeHealth>,
    /// New battery level.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub battery: Option<f64>,
    /// Heartbeat instant as reported by the source.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl NodeUpdate {
    /// Whether the update moves the node or changes its carriageway.
    pub const fn touches_geometry(&self) -> bool {
        self.direction.is_some() || self.position.is_some()
    }
}

// ---------------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------------

const fn default_lane() -> u8 {
    1
}

/// A detected or declared obstruction.
///
/// `clear_time` is present exactly when `status` is
/// [`IncidentStatus::Cleared`], and never precedes `start_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Stable identifier.
    pub id: IncidentId,
    /// Human-readable location label (e.g. `250m Mark`).
    #[serde(default)]
    pub location: String,
    /// Chainage in meters, same axis as nodes.
    pub position: f64,
    /// Carriageway of the obstruction.
    pub direction: Direction,
    /// Lane of the obstruction.
    #[serde(default = "default_lane")]
    pub lane: u8,
    /// Danger level, 1 = highest.
    #[ts(type = "1 | 2 | 3")]
    pub severity: Severity,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// When the incident started.
    pub start_time: DateTime<Utc>,
    /// When the incident was cleared.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub clear_time: Option<DateTime<Utc>>,
    /// How it was detected.
    #[serde(default)]
    pub detected_by: DetectionSource,
}

impl Incident {
    /// Whether the incident currently drives illumination.
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether the incident has been cleared.
    pub const fn is_cleared(&self) -> bool {
        matches!(self.status, IncidentStatus::Cleared)
    }

    /// Repair records that break the clear-time invariant.
    ///
    /// - cleared without a clear time: clear time = start time
    /// - not cleared but carrying a clear time: clear time dropped
    /// - clear time before start time: clamped to start time
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.is_cleared() {
            let at = self.clear_time.unwrap_or(self.start_time);
            self.clear_time = Some(at.max(self.start_time));
        } else {
            self.clear_time = None;
        }
        self
    }

    /// Transition to cleared at `at` (never earlier than the start time).
    ///
    /// Returns `false` without changing anything if already cleared.
    pub fn clear(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_cleared() {
            return false;
        }
        self.status = IncidentStatus::Cleared;
        self.clear_time = Some(at.max(self.start_time));
        true
    }
}

// ---------------------------------------------------------------------------
// Operator event log
// ---------------------------------------------------------------------------

/// One entry of the operator event log.
///
/// Best-effort and capped; not authoritative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Unique identifier.
    pub id: EventId,
    /// Category.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Human-readable message.
    pub message: String,
    /// Severity.
    pub severity: EventSeverity,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a log entry stamped now.
    pub fn now(kind: EventKind, severity: EventSeverity, message: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            kind,
            message: message.into(),
            severity,
            timestamp: Utc::now(),
        }
    }
}
