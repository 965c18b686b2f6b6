//! Perception role highlighting in the traffic simulator

use std::collections::BTreeMap;

use contracts::{Color, TrafficActorId};
use perception::{InRange, PerceptionSubset};

/// Role of an agent relative to ego this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Ego,
    /// Member of the perception subset
    Perceiving,
    /// In range but not selected
    InRange,
    Outside,
}

impl Role {
    pub fn color(&self) -> Color {
        match self {
            Self::Ego => Color::RED,
            Self::Perceiving => Color::MAGENTA,
            Self::InRange => Color::GREEN,
            Self::Outside => Color::YELLOW,
        }
    }
}

/// Role of every tracked agent plus the in-range candidates
pub fn assign_roles(
    ego: &TrafficActorId,
    subset: &PerceptionSubset,
    candidates: &InRange,
    tracked: impl IntoIterator<Item = TrafficActorId>,
) -> BTreeMap<TrafficActorId, Role> {
    let mut roles: BTreeMap<TrafficActorId, Role> =
        tracked.into_iter().map(|id| (id, Role::Outside)).collect();
    for id in candidates.positions.keys() {
        roles.insert(id.clone(), Role::InRange);
    }
    for id in &subset.members {
        roles.insert(id.clone(), Role::Perceiving);
    }
    roles.insert(ego.clone(), Role::Ego);
    roles
}

/// Remembers applied roles so only changes are sent to the engine
#[derive(Debug, Default)]
pub struct RoleHighlighter {
    applied: BTreeMap<TrafficActorId, Role>,
}

impl RoleHighlighter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roles that differ from the last applied ones. Agents no longer
    /// present are forgotten.
    pub fn changes(&mut self, roles: BTreeMap<TrafficActorId, Role>) -> Vec<(TrafficActorId, Role)> {
        let changed = roles
            .iter()
            .filter(|(id, role)| self.applied.get(*id) != Some(*role))
            .map(|(id, role)| (id.clone(), *role))
            .collect();
        self.applied = roles;
        changed
    }
}
