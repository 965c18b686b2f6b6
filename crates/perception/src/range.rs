//! In-range candidate filtering

use std::collections::BTreeMap;

use actor_bridge::Neighbor;
use contracts::{RangePolicy, TrafficActorId};

use crate::Point;

/// Perception candidates of one tick
#[derive(Debug, Clone, Default)]
pub struct InRange {
    /// Candidate positions, ego included
    pub positions: BTreeMap<TrafficActorId, Point>,
    /// Admitted neighbors, ego excluded
    pub neighbor_count: usize,
}

/// Apply `policy` to a proximity query result.
///
/// Ego is always kept as a candidate regardless of its class.
pub fn in_range(ego: &TrafficActorId, neighbors: &[Neighbor], policy: &RangePolicy) -> InRange {
    let mut result = InRange::default();
    for neighbor in neighbors {
        let is_ego = neighbor.id == *ego;
        if !is_ego && !policy.admits(&neighbor.id, neighbor.vclass) {
            continue;
        }
        let point = Point::new(neighbor.location.x, neighbor.location.y);
        if result.positions.insert(neighbor.id.clone(), point).is_none() && !is_ego {
            result.neighbor_count += 1;
        }
    }
    result
}
