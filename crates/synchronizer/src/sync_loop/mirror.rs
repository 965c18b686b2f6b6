//! Reconcile plan execution and transform push

use std::collections::BTreeSet;
use std::fmt::Display;

use actor_bridge::bridge_helper::{
    spawn_transform, to_traffic_signals, to_traffic_transform, to_vehicle_lights,
    to_vehicle_transform,
};
use actor_bridge::{MirrorLink, ReconcilePlan, SpawnOutcome, TrafficSimulator, VehicleSimulator};
use contracts::{
    CosimError, Engine, MeasurementSink, SyncDirection, TrafficActorId, VehicleActorId,
};
use observability::{record_mirror_dropped, record_mirror_spawn_failure};
use tracing::{debug, warn};

use super::{engine_label, recover, SynchronizationLoop};
use crate::Result;

impl<T, V, S> SynchronizationLoop<T, V, S>
where
    T: TrafficSimulator,
    V: VehicleSimulator,
    S: MeasurementSink,
{
    /// Issue the destroys, then the mirror spawns of one reconciliation
    pub(super) async fn execute_plan(&mut self, plan: ReconcilePlan) -> Result<()> {
        let carriers: BTreeSet<VehicleActorId> = self
            .rig
            .attached_agents()
            .iter()
            .filter_map(|agent| self.rig.parent_of(agent))
            .collect();

        for vehicle_id in plan.destroy_in_vehicle {
            if carriers.contains(&vehicle_id) {
                debug!(vehicle = vehicle_id, "Mirror carries riders, destroying after drain");
                self.deferred_destroys.insert(vehicle_id);
                continue;
            }
            let destroyed = self.session.vehicle.destroy_actor(vehicle_id).await;
            if recover(destroyed, "destroy vehicle mirror")?.is_some() {
                self.mirrors.destroyed += 1;
            }
        }
        for traffic_id in plan.destroy_in_traffic {
            let destroyed = self.session.traffic.destroy_actor(&traffic_id).await;
            if recover(destroyed, "destroy traffic mirror")?.is_some() {
                self.mirrors.destroyed += 1;
            }
        }

        for traffic_id in &plan.spawn_in_vehicle {
            self.mirror_into_vehicle(traffic_id).await?;
        }
        for vehicle_id in plan.spawn_in_traffic {
            self.mirror_into_traffic(vehicle_id).await?;
        }
        Ok(())
    }

    async fn mirror_into_vehicle(&mut self, traffic_id: &TrafficActorId) -> Result<()> {
        let snapshot = self.session.traffic.actor(traffic_id).await;
        let Some(actor) = recover(snapshot, "read mirror source")?.flatten() else {
            let outcome = self.registry.vehicle_spawn_failed(traffic_id);
            self.spawn_failed(Engine::Vehicle, traffic_id, outcome, "source agent vanished");
            return Ok(());
        };

        let vehicle = &self.session.vehicle;
        let Some(blueprint) = self
            .catalog
            .blueprint_for(&actor, |bp| vehicle.has_blueprint(bp))
        else {
            warn!(traffic = %traffic_id, type_id = %actor.type_id, vclass = actor.vclass.as_str(), "No blueprint for vehicle type, dropping from sync");
            self.registry.abandon_traffic(traffic_id);
            self.mirrors.dropped += 1;
            record_mirror_dropped(engine_label(Engine::Vehicle));
            return Ok(());
        };

        let transform = spawn_transform(&to_vehicle_transform(
            &actor.transform,
            &actor.extent,
            self.offset,
        ));
        let color = if self.config.sync.sync_vehicle_color {
            actor.color
        } else {
            None
        };

        match self
            .session
            .vehicle
            .spawn_vehicle(&blueprint, transform, color)
            .await
        {
            Ok(vehicle_id) => {
                if self.registry.confirm_vehicle_mirror(traffic_id, vehicle_id) {
                    self.mirrors.spawned += 1;
                    debug!(traffic = %traffic_id, vehicle = vehicle_id, blueprint = %blueprint, "Mirrored into vehicle simulator");
                } else {
                    let destroyed = self.session.vehicle.destroy_actor(vehicle_id).await;
                    recover(destroyed, "destroy duplicate mirror")?;
                }
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                let outcome = self.registry.vehicle_spawn_failed(traffic_id);
                self.spawn_failed(Engine::Vehicle, traffic_id, outcome, err.to_string());
            }
        }
        Ok(())
    }

    async fn mirror_into_traffic(&mut self, vehicle_id: VehicleActorId) -> Result<()> {
        let snapshot = self.session.vehicle.actor(vehicle_id).await;
        let Some(actor) = recover(snapshot, "read mirror source")?.flatten() else {
            let outcome = self.registry.traffic_spawn_failed(vehicle_id);
            self.spawn_failed(Engine::Traffic, vehicle_id, outcome, "source vehicle vanished");
            return Ok(());
        };

        let Some(type_id) = self.catalog.vtype_for(&actor.type_id) else {
            warn!(vehicle = vehicle_id, blueprint = %actor.type_id, "No vehicle type for blueprint, dropping from sync");
            self.registry.abandon_vehicle(vehicle_id);
            self.mirrors.dropped += 1;
            record_mirror_dropped(engine_label(Engine::Traffic));
            return Ok(());
        };
        let color = if self.config.sync.sync_vehicle_color {
            actor.color
        } else {
            None
        };

        match self.session.traffic.spawn_actor(&type_id, color).await {
            Ok(traffic_id) => {
                if self.registry.confirm_traffic_mirror(vehicle_id, traffic_id.clone()) {
                    self.mirrors.spawned += 1;
                    debug!(vehicle = vehicle_id, traffic = %traffic_id, "Mirrored into traffic simulator");
                } else {
                    let destroyed = self.session.traffic.destroy_actor(&traffic_id).await;
                    recover(destroyed, "destroy duplicate mirror")?;
                }
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                let outcome = self.registry.traffic_spawn_failed(vehicle_id);
                self.spawn_failed(Engine::Traffic, vehicle_id, outcome, err.to_string());
            }
        }
        Ok(())
    }

    fn spawn_failed(
        &mut self,
        engine: Engine,
        actor: impl Display,
        outcome: SpawnOutcome,
        message: impl Into<String>,
    ) {
        self.mirrors.spawn_failures += 1;
        record_mirror_spawn_failure(engine_label(engine));

        let (failed_attempts, dropped) = match outcome {
            SpawnOutcome::Retry { failed_attempts } => (failed_attempts, false),
            SpawnOutcome::Dropped { failed_attempts } => (failed_attempts, true),
        };
        let err = CosimError::spawn_failure(engine, actor, failed_attempts, message);
        if dropped {
            self.mirrors.dropped += 1;
            record_mirror_dropped(engine_label(engine));
            warn!(error = %err, "Mirror dropped from sync");
        } else {
            warn!(error = %err, "Mirror spawn failed, retrying next tick");
        }
    }

    /// Copy poses from the source-of-truth simulator onto every live pair
    pub(super) async fn push_transforms(&mut self) -> Result<()> {
        let links: Vec<MirrorLink> = self.registry.links().collect();
        match self.config.sync.vehicle_direction {
            SyncDirection::TrafficToVehicle => {
                for link in &links {
                    self.push_to_vehicle(link).await?;
                }
            }
            SyncDirection::VehicleToTraffic => {
                for link in &links {
                    self.push_to_traffic(link).await?;
                }
            }
        }
        Ok(())
    }

    async fn push_to_vehicle(&self, link: &MirrorLink) -> Result<()> {
        let snapshot = self.session.traffic.actor(&link.traffic).await;
        let Some(source) = recover(snapshot, "read traffic pose")?.flatten() else {
            let err = CosimError::transient_actor(Engine::Traffic, &link.traffic);
            warn!(vehicle = link.vehicle, error = %err, "Skipping transform update");
            return Ok(());
        };
        let target = to_vehicle_transform(&source.transform, &source.extent, self.offset);

        let lights = if self.config.sync.sync_vehicle_lights {
            self.session
                .vehicle
                .actor(link.vehicle)
                .await?
                .map(|current| to_vehicle_lights(current.lights, source.signals))
        } else {
            None
        };

        let pushed = self
            .session
            .vehicle
            .set_transform(link.vehicle, target, lights)
            .await;
        recover(pushed, "push transform to vehicle simulator")?;
        Ok(())
    }

    async fn push_to_traffic(&self, link: &MirrorLink) -> Result<()> {
        let snapshot = self.session.vehicle.actor(link.vehicle).await;
        let Some(source) = recover(snapshot, "read vehicle pose")?.flatten() else {
            let err = CosimError::transient_actor(Engine::Vehicle, link.vehicle);
            warn!(traffic = %link.traffic, error = %err, "Skipping transform update");
            return Ok(());
        };
        let target = to_traffic_transform(&source.transform, &source.extent, self.offset);

        let signals = if self.config.sync.sync_vehicle_lights {
            self.session
                .traffic
                .actor(&link.traffic)
                .await?
                .map(|current| to_traffic_signals(current.signals, source.lights))
        } else {
            None
        };

        let pushed = self
            .session
            .traffic
            .set_transform(&link.traffic, target, signals)
            .await;
        recover(pushed, "push transform to traffic simulator")?;
        Ok(())
    }
}
