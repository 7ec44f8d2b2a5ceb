//! Direction-aware upstream illumination.
//!
//! A node lights up only for incidents on its own carriageway that lie
//! ahead of it in the direction of travel, i.e. for incidents the driver
//! passing the node has not yet reached. Northbound traffic travels toward
//! lower chainage, so a northbound node is upstream of an incident when its
//! position is greater; southbound is the mirror image. The color band is
//! chosen by the distance to the incident.
//!
//! Everything here is pure and deterministic. Blink jitter is applied by
//! the store via [`with_red_jitter`].

use delineator_types::{Direction, Incident, LedColor, Node, SignalState};

/// Upper bound of the red band, in meters.
pub const RED_RANGE_M: f64 = 200.0;
/// Upper bound of the green band, in meters.
pub const GREEN_RANGE_M: f64 = 500.0;
/// Upper bound of the blue band, in meters. Nodes farther away stay dark.
pub const BLUE_RANGE_M: f64 = 700.0;

/// Base blink frequency of the red band.
pub const RED_BLINK_HZ: f64 = 3.0;
/// Blink frequency of the green band.
pub const GREEN_BLINK_HZ: f64 = 2.0;
/// Blink frequency of the blue band.
pub const BLUE_BLINK_HZ: f64 = 1.0;

/// Largest offset [`with_red_jitter`] adds. Kept below 1 so a jittered red
/// never reaches `RED_BLINK_HZ + 1` after rounding.
const MAX_JITTER_HZ: f64 = 0.999_999;

/// Whether a node at `node_position` on `direction` is upstream of an
/// obstruction at `incident_position`.
///
/// A node exactly at the incident position counts as upstream: it is the
/// last marker a driver passes before the obstruction.
pub fn is_upstream(direction: Direction, node_position: f64, incident_position: f64) -> bool {
    match direction {
        Direction::North => node_position >= incident_position,
        Direction::South => node_position <= incident_position,
    }
}

fn lit(color: LedColor, blink_hz: f64) -> SignalState {
    SignalState::new(color, blink_hz).unwrap_or(SignalState::OFF)
}

/// The band for an upstream node at `distance` meters from the incident.
pub fn band(distance: f64) -> SignalState {
    if !distance.is_finite() {
        SignalState::OFF
    } else if distance <= RED_RANGE_M {
        lit(LedColor::Red, RED_BLINK_HZ)
    } else if distance <= GREEN_RANGE_M {
        lit(LedColor::Green, GREEN_BLINK_HZ)
    } else if distance <= BLUE_RANGE_M {
        lit(LedColor::Blue, BLUE_BLINK_HZ)
    } else {
        SignalState::OFF
    }
}

/// Signal a single incident asks of a single node.
pub fn compute_signal(node: &Node, incident: &Incident) -> SignalState {
    if node.direction != incident.direction {
        return SignalState::OFF;
    }
    if !is_upstream(node.direction, node.position, incident.position) {
        return SignalState::OFF;
    }
    band((incident.position - node.position).abs())
}

/// Combine the signals of several incidents for one node.
///
/// Walks the incidents in order: the first lit signal is taken, and a later
/// red signal replaces whatever was taken before. An empty set yields
/// [`SignalState::OFF`]. Callers pass only active incidents.
pub fn combine<'a, I>(node: &Node, incidents: I) -> SignalState
where
    I: IntoIterator<Item = &'a Incident>,
{
    incidents
        .into_iter()
        .map(|incident| compute_signal(node, incident))
        .fold(SignalState::OFF, |current, next| {
            if next.is_lit() && (!current.is_lit() || next.color() == LedColor::Red) {
                next
            } else {
                current
            }
        })
}

/// Raise a red signal's frequency by `offset` Hz, clamped into `[0, 1)`.
/// Other colors are returned unchanged.
pub fn with_red_jitter(signal: SignalState, offset: f64) -> SignalState {
    if signal.color() != LedColor::Red || !offset.is_finite() {
        return signal;
    }
    let offset = offset.clamp(0.0, MAX_JITTER_HZ);
    lit(LedColor::Red, signal.blink_hz() + offset)
}

/// How many nodes show each color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IlluminationSummary {
    /// Nodes lit red.
    pub red: usize,
    /// Nodes lit green.
    pub green: usize,
    /// Nodes lit blue.
    pub blue: usize,
}

impl IlluminationSummary {
    /// Total lit nodes.
    pub const fn lit(&self) -> usize {
        self.red.saturating_add(self.green).saturating_add(self.blue)
    }
}

impl std::fmt::Display for IlluminationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} lit ({} red, {} green, {} blue)",
            self.lit(),
            self.red,
            self.green,
            self.blue
        )
    }
}

/// Count lit nodes by color.
pub fn illumination_summary<'a, I>(nodes: I) -> IlluminationSummary
where
    I: IntoIterator<Item = &'a Node>,
{
    nodes
        .into_iter()
        .fold(IlluminationSummary::default(), |mut acc, node| {
            match node.signal.color() {
                LedColor::Red => acc.red = acc.red.saturating_add(1),
                LedColor::Green => acc.green = acc.green.saturating_add(1),
                LedColor::Blue => acc.blue = acc.blue.saturating_add(1),
                LedColor::Off => {}
            }
            acc
        })
}
