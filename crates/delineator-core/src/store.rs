//! In-memory view of all nodes and incidents.
//!
//! [`EntityStore`] is plain single-owner data: every method takes `&mut
//! self` and runs to completion, so a delta and the signal recomputation it
//! triggers are applied as one unit. Concurrent access goes through
//! [`SharedStore`](crate::shared::SharedStore).
//!
//! Node signals are derived, never taken from input. They are recomputed
//! from the active incident set whenever that set changes, and for a single
//! node whenever it is created or moved.

use std::collections::BTreeMap;

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use delineator_types::{
    Delta, Event, EventKind, EventSeverity, Incident, IncidentId, IncidentStatus, LedColor, Node,
    NodeHealth, NodeId, NodeUpdate, SignalState, SystemStatus,
};

use crate::config::MonitorConfig;
use crate::events::{self, EventLog};
use crate::geometry::{self, illumination_summary};
use crate::status;

/// Construction settings for an [`EntityStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Operator event log capacity.
    pub event_capacity: usize,
    /// Apply random jitter to red blink frequencies.
    pub red_blink_jitter: bool,
    /// Seed for the jitter generator; `None` seeds from the OS.
    pub jitter_seed: Option<u64>,
}

impl StoreSettings {
    /// Settings taken from the monitor configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            event_capacity: config.events.capacity,
            red_blink_jitter: config.signal.red_blink_jitter,
            jitter_seed: config.signal.jitter_seed,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            event_capacity: 100,
            red_blink_jitter: false,
            jitter_seed: None,
        }
    }
}

/// Result of merging a [`NodeUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeMerge {
    /// The node was unknown and has been created.
    Created,
    /// A known node changed.
    Updated,
    /// A known node was already in the reported state.
    Unchanged,
    /// The node was unknown and the update lacked the fields to create it.
    Ignored,
}

impl NodeMerge {
    /// Whether the store changed.
    pub const fn changed(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

/// Result of applying a stream [`Delta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The store changed.
    Applied,
    /// The delta was understood but changed nothing (redelivery, unknown
    /// id, already cleared).
    Unchanged,
    /// Keep-alive or unrecognized message.
    Ignored,
}

/// Owned copy of the store's contents at one revision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSnapshot {
    /// Revision the copy was taken at.
    pub revision: u64,
    /// Derived system status.
    pub status: SystemStatus,
    /// All nodes, ordered by id.
    pub nodes: Vec<Node>,
    /// All incidents, newest first.
    pub incidents: Vec<Incident>,
    /// Operator event log, newest first.
    pub events: Vec<Event>,
}

/// The authoritative in-memory view of nodes and incidents.
#[derive(Debug)]
pub struct EntityStore {
    nodes: BTreeMap<NodeId, Node>,
    incidents: BTreeMap<IncidentId, Incident>,
    events: EventLog,
    revision: u64,
    jitter: Option<SmallRng>,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new(settings: &StoreSettings) -> Self {
        let jitter = settings.red_blink_jitter.then(|| {
            settings
                .jitter_seed
                .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64)
        });
        Self {
            nodes: BTreeMap::new(),
            incidents: BTreeMap::new(),
            events: EventLog::new(settings.event_capacity),
            revision: 0,
            jitter,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Monotonic change counter, bumped by every state-changing call.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Look up a node.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of known nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look up an incident.
    pub fn incident(&self, id: &str) -> Option<&Incident> {
        self.incidents.get(id)
    }

    /// All incidents, newest first.
    pub fn incidents(&self) -> Vec<&Incident> {
        newest_first(self.incidents.values())
    }

    /// Active incidents, newest first. This is the order signals are
    /// combined in.
    pub fn active_incidents(&self) -> Vec<&Incident> {
        active_set(&self.incidents)
    }

    /// The operator event log.
    pub const fn events(&self) -> &EventLog {
        &self.events
    }

    /// Derived system status.
    pub fn status(&self) -> SystemStatus {
        status::aggregate(self.nodes.values(), self.incidents.values())
    }

    /// Owned copy of everything.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            revision: self.revision,
            status: self.status(),
            nodes: self.nodes.values().cloned().collect(),
            incidents: self.incidents().into_iter().cloned().collect(),
            events: self.events.iter().cloned().collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Apply one stream delta, including any signal recomputation it needs.
    pub fn apply_delta(&mut self, delta: Delta) -> DeltaOutcome {
        let before = self.revision;
        match delta {
            Delta::IncidentNew(incident) => {
                self.apply_incident_new(incident);
                self.recompute_signals();
            }
            Delta::IncidentClear(clear) => {
                self.apply_incident_clear(&clear.id);
                self.recompute_signals();
            }
            Delta::NodeUpdate(update) => {
                self.apply_node_update(&update);
            }
            Delta::Snapshot(snapshot) => {
                self.apply_stream_snapshot(snapshot.incidents);
            }
            Delta::KeepAlive | Delta::Unrecognized(_) => return DeltaOutcome::Ignored,
        }
        if self.revision == before {
            DeltaOutcome::Unchanged
        } else {
            DeltaOutcome::Applied
        }
    }

    /// Merge a partial node record.
    ///
    /// Unknown nodes are created only when the update carries direction,
    /// lane and position; otherwise the update is ignored. Only the touched
    /// node's signal is recomputed, and only when it is new or moved.
    pub fn apply_node_update(&mut self, update: &NodeUpdate) -> NodeMerge {
        let merge = if let Some(node) = self.nodes.get_mut(&update.id) {
            let before = node.clone();
            merge_fields(node, update);
            if *node == before {
                NodeMerge::Unchanged
            } else {
                if let Some(event) = events::health_degraded(node, before.health) {
                    self.events.push(event);
                }
                let moved = update.touches_geometry()
                    && (node.direction != before.direction
                        || node.position.to_bits() != before.position.to_bits());
                if moved {
                    let active = active_set(&self.incidents);
                    node.signal = derive_signal(node, &active, self.jitter.as_mut());
                }
                NodeMerge::Updated
            }
        } else if let Some(mut node) = new_node(update) {
            let active = active_set(&self.incidents);
            node.signal = derive_signal(&node, &active, self.jitter.as_mut());
            if let Some(event) = events::health_degraded(&node, NodeHealth::Ok) {
                self.events.push(event);
            }
            tracing::debug!(node = %node.id, position = node.position, "node created from update");
            self.nodes.insert(node.id.clone(), node);
            NodeMerge::Created
        } else {
            tracing::debug!(node = %update.id, "update for unknown node without geometry ignored");
            NodeMerge::Ignored
        };
        if merge.changed() {
            self.bump();
        }
        merge
    }

    /// Insert or overwrite an incident.
    ///
    /// A re-announcement overwrites the stored record, except that an
    /// incident already cleared stays cleared. Returns whether the store
    /// changed. Signals are not recomputed; call
    /// [`recompute_signals`](Self::recompute_signals) afterwards.
    pub fn apply_incident_new(&mut self, incident: Incident) -> bool {
        self.upsert_incident(incident, true)
    }

    /// Mark an incident cleared as of now.
    ///
    /// Unknown or already cleared incidents are left alone. Returns whether
    /// the store changed.
    pub fn apply_incident_clear(&mut self, id: &IncidentId) -> bool {
        let Some(incident) = self.incidents.get_mut(id) else {
            tracing::debug!(incident = %id, "clear for unknown incident ignored");
            return false;
        };
        if !incident.clear(Utc::now()) {
            tracing::debug!(incident = %id, "incident already cleared");
            return false;
        }
        let event = events::incident_cleared(incident);
        self.events.push(event);
        self.bump();
        true
    }

    /// Recompute every node's signal from the active incident set.
    ///
    /// With no active incidents every node goes dark. Returns how many
    /// nodes changed.
    pub fn recompute_signals(&mut self) -> usize {
        let before = illumination_summary(self.nodes.values());
        let active = active_set(&self.incidents);
        let mut changed = 0_usize;
        for node in self.nodes.values_mut() {
            let next = derive_signal(node, &active, self.jitter.as_mut());
            if next != node.signal {
                node.signal = next;
                changed = changed.saturating_add(1);
            }
        }
        if changed > 0 {
            let after = illumination_summary(self.nodes.values());
            if after != before {
                self.events.record(
                    EventKind::LedChange,
                    EventSeverity::Info,
                    format!("Illumination updated: {after}"),
                );
            }
            self.bump();
        }
        changed
    }

    /// Bulk-load nodes and incidents, then recompute signals.
    pub fn seed(&mut self, nodes: Vec<Node>, incidents: Vec<Incident>) {
        let (node_count, incident_count) = (nodes.len(), incidents.len());
        for mut node in nodes {
            node.battery = clamp_battery(node.battery).unwrap_or(node.battery);
            node.signal = SignalState::OFF;
            self.nodes.insert(node.id.clone(), node);
        }
        for incident in incidents {
            self.upsert_incident(incident, false);
        }
        self.events.record(
            EventKind::System,
            EventSeverity::Info,
            format!("Snapshot loaded: {node_count} nodes, {incident_count} incidents"),
        );
        self.bump();
        self.recompute_signals();
        tracing::info!(
            nodes = node_count,
            incidents = incident_count,
            revision = self.revision,
            "store seeded"
        );
    }

    /// Upsert the incident list pushed by the upstream on connect, then
    /// recompute signals. Returns how many incidents changed.
    pub fn apply_stream_snapshot(&mut self, incidents: Vec<Incident>) -> usize {
        let changed = incidents
            .into_iter()
            .map(|incident| self.upsert_incident(incident, true))
            .filter(|changed| *changed)
            .count();
        self.recompute_signals();
        changed
    }

    /// Record a `system` entry in the operator log.
    pub fn note(&mut self, severity: EventSeverity, message: impl Into<String>) {
        self.events.record(EventKind::System, severity, message);
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn upsert_incident(&mut self, incident: Incident, log: bool) -> bool {
        let mut incident = incident.normalized();
        match self.incidents.get(&incident.id) {
            Some(existing) => {
                if existing.is_cleared() && !incident.is_cleared() {
                    tracing::debug!(incident = %incident.id, "re-announced incident stays cleared");
                    incident.status = IncidentStatus::Cleared;
                    incident.clear_time = existing.clear_time;
                    incident = incident.normalized();
                }
                if *existing == incident {
                    return false;
                }
            }
            None => {
                if log && !incident.is_cleared() {
                    self.events.push(events::incident_opened(&incident));
                }
            }
        }
        tracing::debug!(
            incident = %incident.id,
            status = ?incident.status,
            position = incident.position,
            "incident upserted"
        );
        self.incidents.insert(incident.id.clone(), incident);
        self.bump();
        true
    }

    const fn bump(&mut self) {
        self.revision = self.revision.saturating_add(1);
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new(&StoreSettings::default())
    }
}

fn newest_first<'a>(incidents: impl Iterator<Item = &'a Incident>) -> Vec<&'a Incident> {
    let mut list: Vec<&Incident> = incidents.collect();
    list.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| a.id.cmp(&b.id)));
    list
}

fn active_set(incidents: &BTreeMap<IncidentId, Incident>) -> Vec<&Incident> {
    newest_first(incidents.values().filter(|i| i.is_active()))
}

/// Combine the active incidents for one node and apply jitter to red.
///
/// A node that is already red keeps its current frequency so the jitter is
/// not re-rolled on every recomputation.
fn derive_signal(node: &Node, active: &[&Incident], jitter: Option<&mut SmallRng>) -> SignalState {
    let base = geometry::combine(node, active.iter().copied());
    if base.color() != LedColor::Red {
        return base;
    }
    if node.signal.color() == LedColor::Red {
        return node.signal;
    }
    match jitter {
        Some(rng) => geometry::with_red_jitter(base, rng.random::<f64>()),
        None => base,
    }
}

fn clamp_battery(battery: f64) -> Option<f64> {
    battery.is_finite().then(|| battery.clamp(0.0, 100.0))
}

fn merge_fields(node: &mut Node, update: &NodeUpdate) {
    if let Some(direction) = update.direction {
        node.direction = direction;
    }
    if let Some(lane) = update.lane {
        node.lane = lane;
    }
    if let Some(position) = update.position.filter(|p| p.is_finite()) {
        node.position = position;
    }
    if let Some(health) = update.health {
        node.health = health;
    }
    if let Some(battery) = update.battery.and_then(clamp_battery) {
        node.battery = battery;
    }
    if let Some(heartbeat) = update.last_heartbeat {
        node.last_heartbeat = heartbeat;
    }
}

fn new_node(update: &NodeUpdate) -> Option<Node> {
    let direction = update.direction?;
    let lane = update.lane?;
    let position = update.position.filter(|p| p.is_finite())?;
    Some(Node {
        id: update.id.clone(),
        direction,
        lane,
        position,
        health: update.health.unwrap_or(NodeHealth::Ok),
        battery: update.battery.and_then(clamp_battery).unwrap_or(100.0),
        signal: SignalState::OFF,
        last_heartbeat: update.last_heartbeat.unwrap_or_else(Utc::now),
    })
}
