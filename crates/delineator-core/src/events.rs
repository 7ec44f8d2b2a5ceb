//! Operator event log.
//!
//! A bounded, newest-first record of notable state changes, kept for
//! operators. It is derived from store mutations and never read back as
//! state.

use std::collections::VecDeque;

use delineator_types::{
    DetectionSource, Direction, Event, EventKind, EventSeverity, Incident, Node, NodeHealth,
};

/// Bounded newest-first list of [`Event`]s.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<Event>,
    capacity: usize,
}

impl EventLog {
    /// Create an empty log holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an entry, evicting the oldest when full.
    pub fn push(&mut self, event: Event) {
        tracing::debug!(kind = ?event.kind, message = %event.message, "operator event");
        self.entries.push_front(event);
        self.entries.truncate(self.capacity);
    }

    /// Record a new entry stamped now.
    pub fn record(&mut self, kind: EventKind, severity: EventSeverity, message: impl Into<String>) {
        self.push(Event::now(kind, severity, message));
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.entries.iter().take(limit).cloned().collect()
    }

    /// All entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(100)
    }
}

pub(crate) const fn heading(direction: Direction) -> &'static str {
    match direction {
        Direction::North => "Northbound",
        Direction::South => "Southbound",
    }
}

/// Log entry for a newly announced incident.
pub(crate) fn incident_opened(incident: &Incident) -> Event {
    let kind = match incident.detected_by {
        DetectionSource::Manual => EventKind::Accident,
        _ => EventKind::CctvDetection,
    };
    let severity = if incident.severity.level() == 1 {
        EventSeverity::Error
    } else {
        EventSeverity::Warning
    };
    Event::now(
        kind,
        severity,
        format!(
            "Accident detected at {}m - Lane {} ({}) - Severity Level {}",
            incident.position,
            incident.lane,
            heading(incident.direction),
            incident.severity.level()
        ),
    )
}

/// Log entry for a cleared incident.
pub(crate) fn incident_cleared(incident: &Incident) -> Event {
    Event::now(
        EventKind::Cleared,
        EventSeverity::Info,
        format!(
            "Incident {} cleared at {} (Lane {}, {})",
            incident.id,
            incident.location,
            incident.lane,
            heading(incident.direction)
        ),
    )
}

/// Log entry for a node whose health got worse, if it is worth one.
pub(crate) fn health_degraded(node: &Node, previous: NodeHealth) -> Option<Event> {
    match node.health {
        NodeHealth::Error | NodeHealth::Offline if !previous.is_failed() => {
            let state = if node.health == NodeHealth::Offline {
                "went offline"
            } else {
                "reported a fault"
            };
            Some(Event::now(
                EventKind::NodeOffline,
                EventSeverity::Error,
                format!("Node {} {state} at {}m", node.id, node.position),
            ))
        }
        NodeHealth::Warn if previous == NodeHealth::Ok => Some(Event::now(
            EventKind::NodeWarning,
            EventSeverity::Warning,
            format!("Node {} reports degraded health at {}m", node.id, node.position),
        )),
        _ => None,
    }
}
