//! Perception subset upkeep and sensor riders

use actor_bridge::{TrafficSimulator, VehicleSimulator};
use contracts::{CosimError, MeasurementSink, TrafficActorId};
use perception::{in_range, InRange, PerceptionSubset, SubsetDelta};
use tracing::{debug, warn};

use super::{recover, SynchronizationLoop};
use crate::roles::assign_roles;
use crate::Result;

impl<T, V, S> SynchronizationLoop<T, V, S>
where
    T: TrafficSimulator,
    V: VehicleSimulator,
    S: MeasurementSink,
{
    /// Select around an active ego, drain, then detach and attach.
    ///
    /// Returns the subset size and the number of measurements handed to the
    /// sink.
    pub(super) async fn update_riders(&mut self) -> Result<(usize, usize)> {
        let mut members = Vec::new();
        let mut delta = SubsetDelta::default();

        if self.ego.state().is_active() {
            let ego = self.ego.ego().clone();
            let neighbors = self
                .session
                .traffic
                .neighbors(&ego, self.config.perception.comm_range)
                .await?;
            let candidates = in_range(&ego, &neighbors, &self.config.perception.range_policy);

            match self.selector.update(&ego, &candidates.positions) {
                Ok((subset, changes)) => {
                    if self.config.sync.highlight_roles {
                        self.highlight_roles(&ego, &subset, &candidates).await?;
                    }
                    members = subset.members;
                    delta = changes;
                }
                Err(err) => {
                    let err = CosimError::from(err);
                    warn!(error = %err, "Ego has no position, releasing every rider");
                    delta.removed = self.selector.clear();
                }
            }
            self.ego.complete_active_tick(candidates.neighbor_count);
        }

        let mut payloads = 0;
        if self.rig.has_riders() || self.rig.queued_len() > 0 {
            for measurement in self.rig.drain(self.frame).await {
                let written = self.sink.write_measurement(&measurement).await;
                if recover(written, "write measurement")?.is_some() {
                    payloads += 1;
                }
            }
        }
        self.payloads_delivered += payloads as u64;

        for agent in &delta.removed {
            let detached = self.rig.detach(&self.session.vehicle, agent).await;
            recover(detached, "detach riders")?;
        }
        self.release_deferred().await?;

        for agent in &members {
            if self.rig.is_attached(agent) {
                continue;
            }
            // unmirrored members get their riders once the mirror exists
            let Some(parent) = self.registry.vehicle_for(agent) else {
                debug!(agent = %agent, "Perception member not mirrored yet");
                continue;
            };
            let attached = self
                .rig
                .attach(&self.session.vehicle, agent, parent, self.frame)
                .await;
            recover(attached, "attach riders")?;
        }

        Ok((members.len(), payloads))
    }

    /// Destroy mirrors whose riders held them past their counterpart's removal
    pub(super) async fn release_deferred(&mut self) -> Result<()> {
        for vehicle_id in std::mem::take(&mut self.deferred_destroys) {
            let carriers: Vec<TrafficActorId> = self
                .rig
                .attached_agents()
                .into_iter()
                .filter(|agent| self.rig.parent_of(agent) == Some(vehicle_id))
                .collect();
            for agent in &carriers {
                let detached = self.rig.detach(&self.session.vehicle, agent).await;
                recover(detached, "detach riders")?;
            }
            let destroyed = self.session.vehicle.destroy_actor(vehicle_id).await;
            if recover(destroyed, "destroy vehicle mirror")?.is_some() {
                self.mirrors.destroyed += 1;
            }
        }
        Ok(())
    }

    async fn highlight_roles(
        &mut self,
        ego: &TrafficActorId,
        subset: &PerceptionSubset,
        candidates: &InRange,
    ) -> Result<()> {
        let tracked = self.registry.links().map(|link| link.traffic);
        let roles = assign_roles(ego, subset, candidates, tracked);
        for (id, role) in self.roles.changes(roles) {
            let colored = self.session.traffic.set_color(&id, role.color()).await;
            recover(colored, "highlight role")?;
        }
        Ok(())
    }
}
