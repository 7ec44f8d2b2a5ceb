//! Overall system status derived from nodes and incidents.

use delineator_types::{Incident, Node, Severity, SystemStatus};

/// More failed nodes than this makes the system critical.
pub const CRITICAL_FAILED_NODES: usize = 3;

/// Derive the system status. First matching rule wins:
///
/// 1. `critical` if any active incident has severity 1, or more than
///    [`CRITICAL_FAILED_NODES`] nodes are `error`/`offline`
/// 2. `warning` if any incident is active, or at least one node has failed
/// 3. `normal` otherwise
pub fn aggregate<'n, 'i, N, I>(nodes: N, incidents: I) -> SystemStatus
where
    N: IntoIterator<Item = &'n Node>,
    I: IntoIterator<Item = &'i Incident>,
{
    let failed = nodes
        .into_iter()
        .filter(|node| node.health.is_failed())
        .count();

    let mut any_active = false;
    let mut critical_incident = false;
    for incident in incidents.into_iter().filter(|i| i.is_active()) {
        any_active = true;
        if incident.severity == Severity::Critical {
            critical_incident = true;
            break;
        }
    }

    if critical_incident || failed > CRITICAL_FAILED_NODES {
        SystemStatus::Critical
    } else if any_active || failed > 0 {
        SystemStatus::Warning
    } else {
        SystemStatus::Normal
    }
}
