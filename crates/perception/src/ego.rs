//! Ego lifecycle

use std::collections::BTreeSet;

use contracts::{PerceptionConfig, TrafficActorId};
use tracing::info;

/// Ego agent state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgoState {
    NotDeparted,
    Active { since_tick: u64 },
    /// Terminal
    Arrived { at_tick: u64 },
}

impl EgoState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotDeparted => "not_departed",
            Self::Active { .. } => "active",
            Self::Arrived { .. } => "arrived",
        }
    }
}

/// Tracks when the ego departs and when the run around it is over.
///
/// Arrival is decided at the start of a tick: either more than `grace_ticks`
/// active ticks have passed and the last neighborhood was empty, or more than
/// `max_active_ticks` active ticks have passed.
#[derive(Debug)]
pub struct EgoTracker {
    ego: TrafficActorId,
    grace_ticks: u64,
    max_active_ticks: u64,
    state: EgoState,
    active_ticks: u64,
    last_neighbor_count: usize,
}

impl EgoTracker {
    pub fn new(ego: TrafficActorId, grace_ticks: u64, max_active_ticks: u64) -> Self {
        Self {
            ego,
            grace_ticks,
            max_active_ticks,
            state: EgoState::NotDeparted,
            active_ticks: 0,
            last_neighbor_count: 0,
        }
    }

    pub fn from_config(config: &PerceptionConfig) -> Self {
        Self::new(config.ego_id.clone(), config.grace_ticks, config.max_active_ticks)
    }

    pub fn ego(&self) -> &TrafficActorId {
        &self.ego
    }

    pub fn state(&self) -> EgoState {
        self.state
    }

    pub fn active_ticks(&self) -> u64 {
        self.active_ticks
    }

    /// Evaluate the arrival rule before anything else runs this tick
    pub fn begin_tick(&mut self, tick: u64) -> EgoState {
        if let EgoState::Active { since_tick } = self.state {
            let idle = self.active_ticks > self.grace_ticks && self.last_neighbor_count == 0;
            let exhausted = self.active_ticks > self.max_active_ticks;
            if idle || exhausted {
                info!(
                    ego = %self.ego,
                    since_tick,
                    tick,
                    active_ticks = self.active_ticks,
                    exhausted,
                    "Ego arrived"
                );
                self.state = EgoState::Arrived { at_tick: tick };
            }
        }
        self.state
    }

    /// Activate when the ego is among the agents that departed this tick
    pub fn observe_departures(&mut self, tick: u64, departed: &BTreeSet<TrafficActorId>) -> bool {
        if self.state == EgoState::NotDeparted && departed.contains(&self.ego) {
            info!(ego = %self.ego, tick, "Ego departed");
            self.state = EgoState::Active { since_tick: tick };
            self.active_ticks = 0;
            return true;
        }
        false
    }

    /// Record the neighborhood of a finished active tick
    pub fn complete_active_tick(&mut self, neighbor_count: usize) {
        if self.state.is_active() {
            self.active_ticks += 1;
            self.last_neighbor_count = neighbor_count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn departed(ids: &[&str]) -> BTreeSet<TrafficActorId> {
        ids.iter().map(|id| TrafficActorId::from(*id)).collect()
    }

    /// Drive the tracker the way the loop does; returns the arrival tick
    fn run(tracker: &mut EgoTracker, depart_at: u64, neighbors: impl Fn(u64) -> usize) -> Option<u64> {
        for tick in 1..2000 {
            if let EgoState::Arrived { at_tick } = tracker.begin_tick(tick) {
                return Some(at_tick);
            }
            let spawned = if tick == depart_at { departed(&["0"]) } else { departed(&[]) };
            tracker.observe_departures(tick, &spawned);
            if tracker.state().is_active() {
                tracker.complete_active_tick(neighbors(tick));
            }
        }
        None
    }

    #[test]
    fn test_arrival_after_grace_without_neighbors() {
        let mut tracker = EgoTracker::new("0".into(), 150, 800);
        assert_eq!(run(&mut tracker, 5, |_| 0), Some(156));
        assert_eq!(tracker.active_ticks(), 151);
    }

    #[test]
    fn test_neighbors_keep_ego_active_until_max() {
        let mut tracker = EgoTracker::new("0".into(), 150, 800);
        assert_eq!(run(&mut tracker, 5, |_| 3), Some(806));
    }

    #[test]
    fn test_neighborhood_empties_late() {
        let mut tracker = EgoTracker::new("0".into(), 150, 800);
        // neighbors until tick 300, arrival the tick after the first empty one
        assert_eq!(run(&mut tracker, 5, |tick| if tick < 300 { 2 } else { 0 }), Some(301));
    }

    #[test]
    fn test_other_departures_ignored() {
        let mut tracker = EgoTracker::new("0".into(), 150, 800);
        assert!(!tracker.observe_departures(1, &departed(&["1", "2"])));
        assert_eq!(tracker.begin_tick(2), EgoState::NotDeparted);
        tracker.complete_active_tick(0);
        assert_eq!(tracker.active_ticks(), 0);
    }

    #[test]
    fn test_arrived_is_terminal() {
        let mut tracker = EgoTracker::new("0".into(), 0, 800);
        tracker.observe_departures(1, &departed(&["0"]));
        tracker.complete_active_tick(0);
        assert_eq!(tracker.begin_tick(2), EgoState::Arrived { at_tick: 2 });
        assert!(!tracker.observe_departures(3, &departed(&["0"])));
        assert_eq!(tracker.begin_tick(3), EgoState::Arrived { at_tick: 2 });
    }
}
