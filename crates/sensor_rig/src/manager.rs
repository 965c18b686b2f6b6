//! SensorRigManager implementation

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use actor_bridge::VehicleSimulator;
use async_channel::{unbounded, Receiver, Sender};
use contracts::{
    CosimError, Location, RiderSpec, SensorChannel, SensorMeasurement, SensorRigConfig,
    SensorSource, TrafficActorId, Transform, VehicleActorId,
};
use metrics::counter;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SensorRigError};
use crate::metrics::{RigMetrics, RigMetricsSnapshot};
use crate::tap::RiderTap;

struct ChannelQueue {
    tx: Sender<SensorMeasurement>,
    rx: Receiver<SensorMeasurement>,
    /// Entries collected while detaching, returned by the next drain
    staged: Vec<SensorMeasurement>,
}

struct MountedSensor {
    channel: SensorChannel,
    actor_id: VehicleActorId,
    source: Box<dyn SensorSource>,
}

/// Rider bundle of one agent
struct SensorRecord {
    parent: VehicleActorId,
    attached_frame: u64,
    gate: Arc<RwLock<bool>>,
    sensors: Vec<MountedSensor>,
}

/// Sensor rig manager
///
/// Owned by the synchronization loop; only the rider taps run elsewhere.
pub struct SensorRigManager {
    riders: Vec<RiderSpec>,
    drain_timeout: Duration,
    queues: BTreeMap<SensorChannel, ChannelQueue>,
    attached: BTreeMap<TrafficActorId, SensorRecord>,
    metrics: Arc<RigMetrics>,
}

impl SensorRigManager {
    pub fn new(config: &SensorRigConfig) -> Self {
        let queues = config
            .riders
            .iter()
            .map(|r| r.channel)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|channel| {
                let (tx, rx) = unbounded();
                (
                    channel,
                    ChannelQueue {
                        tx,
                        rx,
                        staged: Vec::new(),
                    },
                )
            })
            .collect();

        Self {
            riders: config.riders.clone(),
            drain_timeout: Duration::from_millis(config.drain_timeout_ms),
            queues,
            attached: BTreeMap::new(),
            metrics: Arc::new(RigMetrics::new()),
        }
    }

    pub fn is_attached(&self, agent: &TrafficActorId) -> bool {
        self.attached.contains_key(agent)
    }

    pub fn attached_agents(&self) -> BTreeSet<TrafficActorId> {
        self.attached.keys().cloned().collect()
    }

    pub fn has_riders(&self) -> bool {
        !self.attached.is_empty()
    }

    /// Vehicle an agent's riders are mounted on
    pub fn parent_of(&self, agent: &TrafficActorId) -> Option<VehicleActorId> {
        self.attached.get(agent).map(|r| r.parent)
    }

    /// Entries waiting in the channel queues and staging buffers
    pub fn queued_len(&self) -> usize {
        self.queues
            .values()
            .map(|q| q.rx.len() + q.staged.len())
            .sum()
    }

    pub fn metrics(&self) -> RigMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Mount every configured rider on `parent`.
    ///
    /// Returns false when the agent already carries riders. Mount heights are
    /// raised by the parent's full height.
    #[instrument(name = "sensor_rig_attach", skip(self, sim), fields(agent = %agent))]
    pub async fn attach<V: VehicleSimulator>(
        &mut self,
        sim: &V,
        agent: &TrafficActorId,
        parent: VehicleActorId,
        frame: u64,
    ) -> Result<bool> {
        if self.attached.contains_key(agent) {
            return Ok(false);
        }
        let vehicle = sim
            .actor(parent)
            .await?
            .ok_or_else(|| SensorRigError::ParentMissing {
                agent: agent.clone(),
                parent,
            })?;
        let (_, _, roof) = vehicle.extent.full_size();

        let gate = Arc::new(RwLock::new(true));
        let mut sensors = Vec::with_capacity(self.riders.len());
        for rider in &self.riders {
            match self.mount(sim, rider, parent, roof, &gate).await {
                Ok(sensor) => sensors.push(sensor),
                Err(err) => {
                    warn!(agent = %agent, channel = %rider.channel, error = %err, "Sensor mount failed, rolling back");
                    close_gate(&gate);
                    for sensor in &sensors {
                        sensor.source.stop();
                        if let Err(e) = sim.destroy_actor(sensor.actor_id).await {
                            warn!(sensor = sensor.actor_id, error = %e, "Failed to destroy sensor during rollback");
                        }
                    }
                    return Err(err);
                }
            }
        }

        debug!(agent = %agent, parent, sensors = sensors.len(), "Riders attached");
        self.attached.insert(
            agent.clone(),
            SensorRecord {
                parent,
                attached_frame: frame,
                gate,
                sensors,
            },
        );
        self.update_attached_gauge();
        Ok(true)
    }

    async fn mount<V: VehicleSimulator>(
        &self,
        sim: &V,
        rider: &RiderSpec,
        parent: VehicleActorId,
        roof: f64,
        gate: &Arc<RwLock<bool>>,
    ) -> Result<MountedSensor> {
        let mount = Transform::new(
            Location::new(
                rider.transform.location.x,
                rider.transform.location.y,
                rider.transform.location.z + roof,
            ),
            rider.transform.rotation,
        );
        let actor_id = sim
            .spawn_sensor(rider.channel, mount, parent, &rider.attributes)
            .await?;
        let Some(source) = sim.sensor_source(actor_id) else {
            // best effort, the error below is what matters
            let _ = sim.destroy_actor(actor_id).await;
            return Err(SensorRigError::NoStream { sensor: actor_id });
        };

        let queue = self
            .queues
            .get(&rider.channel)
            .ok_or(SensorRigError::NoStream { sensor: actor_id })?;
        let tap = RiderTap::new(
            rider.channel,
            parent,
            queue.tx.clone(),
            gate.clone(),
            self.metrics.clone(),
        );
        source.listen(tap.into_callback());

        Ok(MountedSensor {
            channel: rider.channel,
            actor_id,
            source,
        })
    }

    /// Unmount an agent's riders.
    ///
    /// The gate closes first, then every queued measurement is moved to the
    /// staging buffers, then the sensors are destroyed. Nothing from this
    /// agent is enqueued once this returns.
    #[instrument(name = "sensor_rig_detach", skip(self, sim), fields(agent = %agent))]
    pub async fn detach<V: VehicleSimulator>(&mut self, sim: &V, agent: &TrafficActorId) -> Result<bool> {
        let Some(record) = self.attached.remove(agent) else {
            return Ok(false);
        };

        close_gate(&record.gate);
        for sensor in &record.sensors {
            sensor.source.stop();
        }

        let mut collected = 0;
        for queue in self.queues.values_mut() {
            while let Ok(measurement) = queue.rx.try_recv() {
                queue.staged.push(measurement);
                collected += 1;
            }
        }

        let mut first_fatal = None;
        for sensor in &record.sensors {
            if let Err(err) = sim.destroy_actor(sensor.actor_id).await {
                if err.is_fatal() {
                    first_fatal.get_or_insert(err);
                } else {
                    warn!(sensor = sensor.actor_id, channel = %sensor.channel, error = %err, "Failed to destroy sensor");
                }
            }
        }
        self.update_attached_gauge();
        debug!(agent = %agent, parent = record.parent, collected, "Riders detached");

        match first_fatal {
            Some(err) => Err(err.into()),
            None => Ok(true),
        }
    }

    /// Detach every agent, continuing past per-agent failures
    pub async fn detach_all<V: VehicleSimulator>(&mut self, sim: &V) -> Result<usize> {
        let agents = self.attached_agents();
        let mut detached = 0;
        for agent in &agents {
            match self.detach(sim, agent).await {
                Ok(_) => detached += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!(agent = %agent, error = %err, "Detach failed"),
            }
        }
        if detached > 0 {
            info!(detached, "All riders detached");
        }
        Ok(detached)
    }

    /// Collect the measurements of `frame`.
    ///
    /// Riders attached before `frame` are expected to deliver once per
    /// channel; each channel waits at most the drain timeout for them.
    /// Staged and late entries are returned too. Ordered by channel, then
    /// arrival.
    pub async fn drain(&mut self, frame: u64) -> Vec<SensorMeasurement> {
        let mut drained = Vec::new();

        for (channel, queue) in self.queues.iter_mut() {
            let mut expected: BTreeSet<VehicleActorId> = self
                .attached
                .values()
                .filter(|r| r.attached_frame < frame)
                .filter(|r| r.sensors.iter().any(|s| s.channel == *channel))
                .map(|r| r.parent)
                .collect();

            for measurement in queue.staged.drain(..) {
                if measurement.frame == frame {
                    expected.remove(&measurement.agent);
                }
                drained.push(measurement);
            }
            while let Ok(measurement) = queue.rx.try_recv() {
                if measurement.frame == frame {
                    expected.remove(&measurement.agent);
                }
                drained.push(measurement);
            }

            let started = Instant::now();
            let deadline = started + self.drain_timeout;
            while !expected.is_empty() {
                match timeout_at(deadline, queue.rx.recv()).await {
                    Ok(Ok(measurement)) => {
                        if measurement.frame == frame {
                            expected.remove(&measurement.agent);
                        }
                        drained.push(measurement);
                    }
                    // every sender dropped; nothing more can arrive
                    Ok(Err(_)) => break,
                    Err(_) => {
                        let err = CosimError::QueueDrainTimeout {
                            channel: *channel,
                            waited_ms: started.elapsed().as_millis() as u64,
                            missing: expected.iter().copied().collect(),
                        };
                        warn!(frame, channel = %channel, error = %err, "Sensor data missing for this tick");
                        self.metrics.record_drain_timeout();
                        counter!("cosim_sensor_drain_timeouts_total", "channel" => channel.dir_name())
                            .increment(1);
                        break;
                    }
                }
            }
        }

        drained
    }

    fn update_attached_gauge(&self) {
        let count = self.attached.values().map(|r| r.sensors.len()).sum();
        self.metrics.set_attached_sensors(count);
    }
}

fn close_gate(gate: &RwLock<bool>) {
    match gate.write() {
        Ok(mut open) => *open = false,
        Err(poisoned) => *poisoned.into_inner() = false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actor_bridge::{MockVehicleConfig, MockVehicleSim};
    use contracts::VehicleEndpoint;

    fn rig_config(channels: &[SensorChannel], drain_timeout_ms: u64) -> SensorRigConfig {
        let small: BTreeMap<String, String> = [
            ("image_size_x", "8"),
            ("image_size_y", "6"),
            ("channels", "2"),
            ("points_per_second", "200"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        SensorRigConfig {
            drain_timeout_ms,
            riders: channels
                .iter()
                .map(|c| RiderSpec::new(*c, Transform::default(), small.clone()))
                .collect(),
        }
    }

    async fn sim_with_vehicle(config: MockVehicleConfig) -> (MockVehicleSim, VehicleActorId) {
        let mut sim = MockVehicleSim::new(config);
        sim.connect(&VehicleEndpoint::default()).await.unwrap();
        let id = sim
            .spawn_vehicle("vehicle.audi.a2", Transform::default(), None)
            .await
            .unwrap();
        (sim, id)
    }

    #[tokio::test]
    async fn test_attach_is_idempotent() {
        let (sim, parent) = sim_with_vehicle(MockVehicleConfig::default()).await;
        let mut rig = SensorRigManager::new(&rig_config(&[SensorChannel::Camera, SensorChannel::Lidar], 1000));
        let agent = TrafficActorId::from("7");

        assert!(rig.attach(&sim, &agent, parent, 0).await.unwrap());
        assert!(!rig.attach(&sim, &agent, parent, 0).await.unwrap());
        assert_eq!(sim.sensors_on(parent).len(), 2);
        assert_eq!(rig.metrics().attached_sensors, 2);
        assert_eq!(rig.parent_of(&agent), Some(parent));
    }

    #[tokio::test]
    async fn test_mount_raised_by_vehicle_height() {
        let (sim, parent) = sim_with_vehicle(MockVehicleConfig::default()).await;
        let mut rig = SensorRigManager::new(&rig_config(&[SensorChannel::Camera], 1000));
        rig.attach(&sim, &"7".into(), parent, 0).await.unwrap();

        sim.step().await.unwrap();
        let drained = rig.drain(1).await;
        assert_eq!(drained.len(), 1);
        // audi.a2 mock extent z is 0.75
        assert!((drained[0].sensor_transform.location.z - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_attach_missing_parent() {
        let (sim, _) = sim_with_vehicle(MockVehicleConfig::default()).await;
        let mut rig = SensorRigManager::new(&rig_config(&[SensorChannel::Camera], 1000));
        let err = rig.attach(&sim, &"7".into(), 4242, 0).await.unwrap_err();
        assert!(matches!(err, SensorRigError::ParentMissing { .. }));
        assert!(!rig.has_riders());
    }

    #[tokio::test]
    async fn test_drain_orders_by_channel() {
        let (sim, parent) = sim_with_vehicle(MockVehicleConfig::default()).await;
        let other = sim
            .spawn_vehicle("vehicle.tesla.model3", Transform::default(), None)
            .await
            .unwrap();
        let mut rig = SensorRigManager::new(&rig_config(
            &[SensorChannel::Lidar, SensorChannel::Camera, SensorChannel::SemanticLidar],
            5000,
        ));
        rig.attach(&sim, &"1".into(), parent, 0).await.unwrap();
        rig.attach(&sim, &"2".into(), other, 0).await.unwrap();

        sim.step().await.unwrap();
        let drained = rig.drain(1).await;
        assert_eq!(drained.len(), 6);
        let channels: Vec<SensorChannel> = drained.iter().map(|m| m.channel).collect();
        assert_eq!(&channels[0..2], &[SensorChannel::Camera; 2]);
        assert_eq!(&channels[2..4], &[SensorChannel::Lidar; 2]);
        assert_eq!(&channels[4..6], &[SensorChannel::SemanticLidar; 2]);
        assert!(drained.iter().all(|m| m.frame == 1));
        assert_eq!(rig.metrics().drain_timeouts, 0);
    }

    #[tokio::test]
    async fn test_rider_attached_this_frame_not_awaited() {
        let (sim, parent) = sim_with_vehicle(MockVehicleConfig::default()).await;
        let mut rig = SensorRigManager::new(&rig_config(&[SensorChannel::Camera], 60_000));
        sim.step().await.unwrap();
        rig.attach(&sim, &"1".into(), parent, 1).await.unwrap();

        // returns at once, the rider first fires on the next step
        let drained = tokio::time::timeout(Duration::from_secs(1), rig.drain(1))
            .await
            .unwrap();
        assert!(drained.is_empty());
    }

    #[tokio::test]
    async fn test_drain_timeout_on_muted_channel() {
        let (sim, parent) = sim_with_vehicle(MockVehicleConfig {
            muted_channels: vec![SensorChannel::Lidar],
            ..Default::default()
        })
        .await;
        let mut rig = SensorRigManager::new(&rig_config(&[SensorChannel::Camera, SensorChannel::Lidar], 50));
        rig.attach(&sim, &"1".into(), parent, 0).await.unwrap();

        sim.step().await.unwrap();
        let drained = rig.drain(1).await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].channel, SensorChannel::Camera);
        assert_eq!(rig.metrics().drain_timeouts, 1);
    }

    #[tokio::test]
    async fn test_detach_after_pending_delivery() {
        let (sim, parent) = sim_with_vehicle(MockVehicleConfig::default()).await;
        let mut rig = SensorRigManager::new(&rig_config(&[SensorChannel::Camera, SensorChannel::Lidar], 1000));
        let agent = TrafficActorId::from("1");
        rig.attach(&sim, &agent, parent, 0).await.unwrap();

        // measurements are in flight on the delivery threads while detaching
        sim.step().await.unwrap();
        assert!(rig.detach(&sim, &agent).await.unwrap());
        assert!(sim.sensors_on(parent).is_empty());

        let after_detach = rig.queued_len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rig.queued_len(), after_detach);

        // staged entries come back on the next drain, nothing is awaited
        let drained = rig.drain(1).await;
        assert_eq!(drained.len(), after_detach);
        assert!(drained.iter().all(|m| m.agent == parent));

        sim.step().await.unwrap();
        assert!(rig.drain(2).await.is_empty());
        assert!(!rig.detach(&sim, &agent).await.unwrap());
    }

    #[tokio::test]
    async fn test_detach_all() {
        let (sim, parent) = sim_with_vehicle(MockVehicleConfig::default()).await;
        let other = sim
            .spawn_vehicle("vehicle.audi.a2", Transform::default(), None)
            .await
            .unwrap();
        let mut rig = SensorRigManager::new(&rig_config(&[SensorChannel::Camera], 1000));
        rig.attach(&sim, &"1".into(), parent, 0).await.unwrap();
        rig.attach(&sim, &"2".into(), other, 0).await.unwrap();

        assert_eq!(rig.detach_all(&sim).await.unwrap(), 2);
        assert!(!rig.has_riders());
        assert_eq!(sim.sensor_count(), 0);
        assert_eq!(rig.metrics().attached_sensors, 0);
    }
}
