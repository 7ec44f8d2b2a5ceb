//! Enumeration types shared by the monitor and its display layer.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Carriageway direction
// ---------------------------------------------------------------------------

/// One of the two opposing carriageways.
///
/// Both carriageways share the same chainage axis but are driven in
/// opposite orders: northbound traffic travels from high chainage to low,
/// southbound traffic from low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Northbound carriageway (upstream side has higher chainage).
    #[serde(alias = "inbound", alias = "n", alias = "nb")]
    North,
    /// Southbound carriageway (upstream side has lower chainage).
    #[serde(alias = "outbound", alias = "s", alias = "sb")]
    South,
}

impl Direction {
    /// Map an upstream carriageway label to a direction.
    ///
    /// The field gateway speaks `outbound`/`inbound`; operators also use
    /// compass shorthands. Matching is case-insensitive and anything that
    /// is not a southbound label is treated as northbound.
    pub fn from_carriageway(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "outbound" | "south" | "s" | "sb" => Self::South,
            _ => Self::North,
        }
    }

    /// The carriageway label used by the incident command endpoint.
    pub const fn carriageway(self) -> &'static str {
        match self {
            Self::North => "inbound",
            Self::South => "outbound",
        }
    }

    /// The opposing carriageway.
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
        }
    }
}

// ---------------------------------------------------------------------------
// Node health and signal color
// ---------------------------------------------------------------------------

/// Health reported by a node's last heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum NodeHealth {
    /// Operating normally.
    Ok,
    /// Degraded but still signalling.
    Warn,
    /// Hardware fault.
    Error,
    /// No heartbeat received.
    Offline,
}

impl NodeHealth {
    /// Whether the node counts as failed (`error` or `offline`).
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Error | Self::Offline)
    }
}

/// Color of a node's warning light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    /// Closest band: 0-200 m upstream.
    Red,
    /// Middle band: 200-500 m upstream.
    Green,
    /// Pre-warning band: 500-700 m upstream.
    Blue,
    /// Not illuminated.
    Off,
}

impl LedColor {
    /// Whether the light is on.
    pub const fn is_lit(self) -> bool {
        !matches!(self, Self::Off)
    }
}

// ---------------------------------------------------------------------------
// Incident attributes
// ---------------------------------------------------------------------------

/// Error returned when a severity level is outside `1..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("severity must be 1, 2 or 3, got {0}")]
pub struct InvalidSeverity(pub u8);

/// Incident severity. Level 1 is the most dangerous.
///
/// Serialized as the bare integer level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    /// Level 1: highest danger.
    Critical,
    /// Level 2.
    Major,
    /// Level 3: lowest danger.
    Minor,
}

impl Severity {
    /// The numeric level (1 = highest danger).
    pub const fn level(self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::Major => 2,
            Self::Minor => 3,
        }
    }
}

impl TryFrom<u8> for Severity {
    type Error = InvalidSeverity;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Self::Critical),
            2 => Ok(Self::Major),
            3 => Ok(Self::Minor),
            other => Err(InvalidSeverity(other)),
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.level()
    }
}

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    /// Declared, but the field gateway has not confirmed it. Not illuminated.
    Pending,
    /// Obstruction in place; upstream nodes are lit.
    Active,
    /// Obstruction removed. Terminal.
    Cleared,
}

impl IncidentStatus {
    /// Whether the incident drives node illumination.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// How an incident was detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    /// Roadside camera analytics.
    #[serde(alias = "camera")]
    Cctv,
    /// In-road sensor.
    Sensor,
    /// Declared by an operator.
    #[default]
    Manual,
}

// ---------------------------------------------------------------------------
// Derived status and operator log
// ---------------------------------------------------------------------------

/// Overall system severity shown to operators.
///
/// Ordered so that `Critical` is the maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    /// No active incidents, no failed nodes.
    #[default]
    Normal,
    /// Something needs attention.
    Warning,
    /// A critical incident or widespread node failure.
    Critical,
}

/// Category of an operator event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new incident was declared.
    Accident,
    /// An incident was cleared.
    Cleared,
    /// A node went offline or reported an error.
    NodeOffline,
    /// A node reported degraded health.
    NodeWarning,
    /// Connection and lifecycle notices.
    System,
    /// An incident was detected by a camera or sensor.
    CctvDetection,
    /// Node illumination changed.
    LedChange,
}

/// Severity of an operator event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Fault.
    Error,
}
