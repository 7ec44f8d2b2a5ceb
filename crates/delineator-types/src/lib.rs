//! Shared type definitions for the delineator incident monitor.
//!
//! This crate is the single source of truth for the data exchanged between
//! the upstream incident service, the monitor core, and the display layer.
//! Types flow downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers for nodes, incidents, log entries
//! - [`enums`] -- Direction, health, light color, severity and status enums
//! - [`structs`] -- Nodes, incidents, signal state, operator log entries
//! - [`wire`] -- Stream delta envelope and incident commands

pub mod enums;
pub mod ids;
pub mod structs;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use enums::{
    DetectionSource, Direction, EventKind, EventSeverity, IncidentStatus, InvalidSeverity,
    LedColor, NodeHealth, Severity, SystemStatus,
};
pub use ids::{EventId, IncidentId, NodeId};
pub use structs::{Event, Incident, InvalidSignal, Node, NodeUpdate, SignalState};
pub use wire::{
    Command, CommandAck, DecodeError, Delta, IncidentClear, InvalidCommand, StreamSnapshot,
};
