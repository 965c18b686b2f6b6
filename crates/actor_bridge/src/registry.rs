//! ActorRegistry - bidirectional id map between the two simulators
//!
//! The registry only plans. The synchronization loop executes the plan against
//! the engines and reports each spawn outcome back.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use contracts::{TrafficActorId, VehicleActorId};
use tracing::{debug, warn};

/// Simulator an actor originated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Traffic,
    Vehicle,
}

/// Spawn/destroy sets reported by both engines for one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub spawned_traffic: BTreeSet<TrafficActorId>,
    pub destroyed_traffic: BTreeSet<TrafficActorId>,
    pub spawned_vehicle: BTreeSet<VehicleActorId>,
    pub destroyed_vehicle: BTreeSet<VehicleActorId>,
}

/// Instructions produced by one reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Traffic agents needing a mirror in the vehicle simulator
    pub spawn_in_vehicle: Vec<TrafficActorId>,
    /// Traffic agents whose counterpart vanished
    pub destroy_in_traffic: Vec<TrafficActorId>,
    /// Vehicles needing a mirror in the traffic simulator
    pub spawn_in_traffic: Vec<VehicleActorId>,
    /// Vehicles whose counterpart vanished
    pub destroy_in_vehicle: Vec<VehicleActorId>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.spawn_in_vehicle.is_empty()
            && self.destroy_in_traffic.is_empty()
            && self.spawn_in_traffic.is_empty()
            && self.destroy_in_vehicle.is_empty()
    }
}

/// One live mirrored pair
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorLink {
    pub traffic: TrafficActorId,
    pub vehicle: VehicleActorId,
    pub origin: Origin,
}

/// Sync state of one actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorStatus {
    Mirrored,
    /// Unmirrored, spawn re-planned next tick
    Retrying { failed_attempts: u32 },
    /// Gave up; excluded from sync
    Dropped,
    Unknown,
}

/// Result of reporting a failed mirror spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Retry { failed_attempts: u32 },
    Dropped { failed_attempts: u32 },
}

/// Bidirectional id map with lifecycle bookkeeping
#[derive(Debug)]
pub struct ActorRegistry {
    max_spawn_retries: u32,
    links: BTreeMap<TrafficActorId, (VehicleActorId, Origin)>,
    reverse: HashMap<VehicleActorId, TrafficActorId>,
    pending_traffic: BTreeMap<TrafficActorId, u32>,
    pending_vehicle: BTreeMap<VehicleActorId, u32>,
    dropped_traffic: BTreeSet<TrafficActorId>,
    dropped_vehicle: BTreeSet<VehicleActorId>,
}

impl ActorRegistry {
    pub fn new(max_spawn_retries: u32) -> Self {
        Self {
            max_spawn_retries,
            links: BTreeMap::new(),
            reverse: HashMap::new(),
            pending_traffic: BTreeMap::new(),
            pending_vehicle: BTreeMap::new(),
            dropped_traffic: BTreeSet::new(),
            dropped_vehicle: BTreeSet::new(),
        }
    }

    /// Reconcile one tick of engine reports.
    ///
    /// Destroys are applied before spawns: an id reported both spawned and
    /// destroyed in the same tick is never planned for mirroring.
    pub fn reconcile(&mut self, report: &TickReport) -> ReconcilePlan {
        let mut plan = ReconcilePlan::default();

        for id in &report.destroyed_traffic {
            self.pending_traffic.remove(id);
            self.dropped_traffic.remove(id);
            if let Some((vehicle, _)) = self.links.remove(id) {
                self.reverse.remove(&vehicle);
                plan.destroy_in_vehicle.push(vehicle);
            }
        }
        for id in &report.destroyed_vehicle {
            self.pending_vehicle.remove(id);
            self.dropped_vehicle.remove(id);
            if let Some(traffic) = self.reverse.remove(id) {
                self.links.remove(&traffic);
                plan.destroy_in_traffic.push(traffic);
            }
        }

        for id in &report.spawned_traffic {
            if report.destroyed_traffic.contains(id)
                || self.links.contains_key(id)
                || self.dropped_traffic.contains(id)
            {
                continue;
            }
            self.pending_traffic.entry(id.clone()).or_insert(0);
        }
        for id in &report.spawned_vehicle {
            if report.destroyed_vehicle.contains(id)
                || self.reverse.contains_key(id)
                || self.dropped_vehicle.contains(id)
            {
                continue;
            }
            self.pending_vehicle.entry(*id).or_insert(0);
        }

        plan.spawn_in_vehicle = self.pending_traffic.keys().cloned().collect();
        plan.spawn_in_traffic = self.pending_vehicle.keys().copied().collect();

        if !plan.is_empty() {
            debug!(
                spawn_in_vehicle = plan.spawn_in_vehicle.len(),
                destroy_in_vehicle = plan.destroy_in_vehicle.len(),
                spawn_in_traffic = plan.spawn_in_traffic.len(),
                destroy_in_traffic = plan.destroy_in_traffic.len(),
                "reconcile plan"
            );
        }
        plan
    }

    /// Record a successful mirror of a traffic agent.
    ///
    /// Returns false (and records nothing) if either id is already linked.
    pub fn confirm_vehicle_mirror(&mut self, traffic: &TrafficActorId, vehicle: VehicleActorId) -> bool {
        if self.links.contains_key(traffic) || self.reverse.contains_key(&vehicle) {
            warn!(traffic = %traffic, vehicle, "mirror already linked, ignoring");
            return false;
        }
        self.pending_traffic.remove(traffic);
        self.links.insert(traffic.clone(), (vehicle, Origin::Traffic));
        self.reverse.insert(vehicle, traffic.clone());
        true
    }

    /// Record a successful mirror of a vehicle simulator actor
    pub fn confirm_traffic_mirror(&mut self, vehicle: VehicleActorId, traffic: TrafficActorId) -> bool {
        if self.links.contains_key(&traffic) || self.reverse.contains_key(&vehicle) {
            warn!(traffic = %traffic, vehicle, "mirror already linked, ignoring");
            return false;
        }
        self.pending_vehicle.remove(&vehicle);
        self.reverse.insert(vehicle, traffic.clone());
        self.links.insert(traffic, (vehicle, Origin::Vehicle));
        true
    }

    /// Record a rejected mirror spawn of a traffic agent
    pub fn vehicle_spawn_failed(&mut self, traffic: &TrafficActorId) -> SpawnOutcome {
        let max = self.max_spawn_retries;
        let Some(failed) = self.pending_traffic.get_mut(traffic) else {
            return SpawnOutcome::Dropped { failed_attempts: 0 };
        };
        *failed += 1;
        let failed_attempts = *failed;
        if failed_attempts > max {
            self.pending_traffic.remove(traffic);
            self.dropped_traffic.insert(traffic.clone());
            warn!(traffic = %traffic, failed_attempts, "mirror spawn retries exhausted, dropping from sync");
            SpawnOutcome::Dropped { failed_attempts }
        } else {
            SpawnOutcome::Retry { failed_attempts }
        }
    }

    /// Record a rejected mirror spawn of a vehicle simulator actor
    pub fn traffic_spawn_failed(&mut self, vehicle: VehicleActorId) -> SpawnOutcome {
        let max = self.max_spawn_retries;
        let Some(failed) = self.pending_vehicle.get_mut(&vehicle) else {
            return SpawnOutcome::Dropped { failed_attempts: 0 };
        };
        *failed += 1;
        let failed_attempts = *failed;
        if failed_attempts > max {
            self.pending_vehicle.remove(&vehicle);
            self.dropped_vehicle.insert(vehicle);
            warn!(vehicle, failed_attempts, "mirror spawn retries exhausted, dropping from sync");
            SpawnOutcome::Dropped { failed_attempts }
        } else {
            SpawnOutcome::Retry { failed_attempts }
        }
    }

    /// Drop a traffic agent that can never be mirrored (no matching blueprint)
    pub fn abandon_traffic(&mut self, traffic: &TrafficActorId) {
        if self.pending_traffic.remove(traffic).is_some() {
            self.dropped_traffic.insert(traffic.clone());
        }
    }

    /// Drop a vehicle that can never be mirrored (no matching vehicle type)
    pub fn abandon_vehicle(&mut self, vehicle: VehicleActorId) {
        if self.pending_vehicle.remove(&vehicle).is_some() {
            self.dropped_vehicle.insert(vehicle);
        }
    }

    pub fn vehicle_for(&self, traffic: &TrafficActorId) -> Option<VehicleActorId> {
        self.links.get(traffic).map(|(vehicle, _)| *vehicle)
    }

    pub fn traffic_for(&self, vehicle: VehicleActorId) -> Option<&TrafficActorId> {
        self.reverse.get(&vehicle)
    }

    pub fn traffic_status(&self, traffic: &TrafficActorId) -> MirrorStatus {
        if self.links.contains_key(traffic) {
            MirrorStatus::Mirrored
        } else if let Some(failed) = self.pending_traffic.get(traffic) {
            MirrorStatus::Retrying {
                failed_attempts: *failed,
            }
        } else if self.dropped_traffic.contains(traffic) {
            MirrorStatus::Dropped
        } else {
            MirrorStatus::Unknown
        }
    }

    pub fn vehicle_status(&self, vehicle: VehicleActorId) -> MirrorStatus {
        if self.reverse.contains_key(&vehicle) {
            MirrorStatus::Mirrored
        } else if let Some(failed) = self.pending_vehicle.get(&vehicle) {
            MirrorStatus::Retrying {
                failed_attempts: *failed,
            }
        } else if self.dropped_vehicle.contains(&vehicle) {
            MirrorStatus::Dropped
        } else {
            MirrorStatus::Unknown
        }
    }

    /// Live pairs in traffic id order
    pub fn links(&self) -> impl Iterator<Item = MirrorLink> + '_ {
        self.links.iter().map(|(traffic, (vehicle, origin))| MirrorLink {
            traffic: traffic.clone(),
            vehicle: *vehicle,
            origin: *origin,
        })
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped_traffic.len() + self.dropped_vehicle.len()
    }

    /// Remove every pair, returning them so the caller can destroy the mirrors
    pub fn teardown(&mut self) -> Vec<MirrorLink> {
        let links: Vec<MirrorLink> = self.links().collect();
        self.links.clear();
        self.reverse.clear();
        self.pending_traffic.clear();
        self.pending_vehicle.clear();
        links
    }

    /// Both maps describe the same bijection and no id is linked and pending at once
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.links.len() != self.reverse.len() {
            return Err(format!(
                "forward map has {} entries, reverse map {}",
                self.links.len(),
                self.reverse.len()
            ));
        }
        for (traffic, (vehicle, _)) in &self.links {
            match self.reverse.get(vehicle) {
                Some(back) if back == traffic => {}
                other => {
                    return Err(format!(
                        "traffic '{}' -> vehicle {} maps back to {:?}",
                        traffic, vehicle, other
                    ))
                }
            }
            if self.pending_traffic.contains_key(traffic) {
                return Err(format!("traffic '{}' is linked and pending", traffic));
            }
            if self.pending_vehicle.contains_key(vehicle) {
                return Err(format!("vehicle {} is linked and pending", vehicle));
            }
        }
        Ok(())
    }
}
