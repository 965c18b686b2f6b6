//! Farthest-point sampling

use std::collections::{BTreeMap, BTreeSet};

use contracts::TrafficActorId;
use metrics::gauge;
use nalgebra::distance;
use tracing::debug;

use crate::error::{PerceptionError, Result};
use crate::Point;

/// Agents selected for one tick, in selection order with ego first
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PerceptionSubset {
    pub members: Vec<TrafficActorId>,
}

impl PerceptionSubset {
    pub fn contains(&self, id: &TrafficActorId) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ids(&self) -> BTreeSet<TrafficActorId> {
        self.members.iter().cloned().collect()
    }
}

/// Subset change between two consecutive ticks
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubsetDelta {
    /// Newly selected, need riders attached
    pub added: BTreeSet<TrafficActorId>,
    /// No longer selected, riders to detach
    pub removed: BTreeSet<TrafficActorId>,
    pub retained: BTreeSet<TrafficActorId>,
}

impl SubsetDelta {
    pub fn between(previous: &BTreeSet<TrafficActorId>, current: &BTreeSet<TrafficActorId>) -> Self {
        Self {
            added: current.difference(previous).cloned().collect(),
            removed: previous.difference(current).cloned().collect(),
            retained: current.intersection(previous).cloned().collect(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Select at most `k` agents spreading out from `ego`.
///
/// With `k` or fewer candidates every one is selected. Otherwise ego seeds the
/// solution and each round adds the candidate farthest from the solution set,
/// scanning in ascending id order so the first maximum wins.
pub fn select(ego: &TrafficActorId, positions: &BTreeMap<TrafficActorId, Point>, k: usize) -> Result<PerceptionSubset> {
    let ego_position = positions
        .get(ego)
        .ok_or_else(|| PerceptionError::EgoMissing { ego: ego.clone() })?;

    let k = k.max(1);
    if positions.len() <= k {
        let mut members = vec![ego.clone()];
        members.extend(positions.keys().filter(|id| *id != ego).cloned());
        return Ok(PerceptionSubset { members });
    }

    // (id, position, distance to the solution set); None once selected
    let mut candidates: Vec<(&TrafficActorId, &Point, Option<f64>)> = positions
        .iter()
        .filter(|(id, _)| *id != ego)
        .map(|(id, p)| (id, p, Some(distance(ego_position, p))))
        .collect();

    let mut members = Vec::with_capacity(k);
    members.push(ego.clone());

    for _ in 1..k {
        let mut best: Option<(usize, f64)> = None;
        for (index, (_, _, min_distance)) in candidates.iter().enumerate() {
            let Some(d) = *min_distance else { continue };
            if best.map_or(true, |(_, best_d)| d > best_d) {
                best = Some((index, d));
            }
        }
        let Some((picked, _)) = best else { break };

        let (picked_id, picked_position, _) = candidates[picked];
        candidates[picked].2 = None;
        members.push(picked_id.clone());

        for (_, position, min_distance) in candidates.iter_mut() {
            if let Some(d) = min_distance {
                *d = d.min(distance(picked_position, *position));
            }
        }
    }

    Ok(PerceptionSubset { members })
}

/// Stateful selector remembering the previous subset
#[derive(Debug)]
pub struct PerceptionSelector {
    sample_size: usize,
    previous: BTreeSet<TrafficActorId>,
}

impl PerceptionSelector {
    pub fn new(sample_size: usize) -> Self {
        Self {
            sample_size,
            previous: BTreeSet::new(),
        }
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Members of the last successful selection
    pub fn previous(&self) -> &BTreeSet<TrafficActorId> {
        &self.previous
    }

    /// Select this tick's subset and diff it against the last one
    pub fn update(
        &mut self,
        ego: &TrafficActorId,
        positions: &BTreeMap<TrafficActorId, Point>,
    ) -> Result<(PerceptionSubset, SubsetDelta)> {
        let subset = select(ego, positions, self.sample_size)?;
        let current = subset.ids();
        let delta = SubsetDelta::between(&self.previous, &current);

        gauge!("cosim_perception_subset_size").set(subset.len() as f64);
        if !delta.is_unchanged() {
            debug!(
                added = delta.added.len(),
                removed = delta.removed.len(),
                size = subset.len(),
                "Perception subset changed"
            );
        }

        self.previous = current;
        Ok((subset, delta))
    }

    /// Forget the previous subset; the returned set must be detached
    pub fn clear(&mut self) -> BTreeSet<TrafficActorId> {
        std::mem::take(&mut self.previous)
    }
}
