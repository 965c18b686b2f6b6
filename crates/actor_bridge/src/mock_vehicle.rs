//! Mock vehicle simulator
//!
//! Keeps an in-memory world, reports spawned/destroyed vehicles by diffing the
//! live set across steps and fires one synthetic measurement per listening
//! sensor on every step.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use contracts::{
    Color, Engine, Extent, ImageData, ImageFormat, LandmarkId, Location, PointCloudData, Rotation,
    SensorChannel, SensorMeasurement, SensorPayload, SensorSource, TrafficLightState, Transform,
    VehicleActor, VehicleActorId, VehicleEndpoint, VehicleLights,
};
use tracing::{debug, instrument};

use crate::client::{StepReport, VehicleSimulator, WorldSettings};
use crate::error::{Result, SimulatorError};
use crate::lock;
use crate::mock_sensor::MockSensor;

/// Vehicle that appears in the world on its own (e.g. a manually driven car)
#[derive(Debug, Clone)]
pub struct ScriptedVehicle {
    pub blueprint: String,
    pub spawn_frame: u64,
    pub destroy_frame: Option<u64>,
    pub transform: Transform,
}

/// Mock vehicle simulator configuration
#[derive(Debug, Clone)]
pub struct MockVehicleConfig {
    /// Blueprint library
    pub blueprints: Vec<String>,
    /// Landmarks with a traffic light
    pub landmarks: Vec<LandmarkId>,
    pub scripted: Vec<ScriptedVehicle>,
    /// Number of upcoming spawn_vehicle calls that fail
    pub fail_spawns: u32,
    /// Channels whose sensors never deliver
    pub muted_channels: Vec<SensorChannel>,
}

impl Default for MockVehicleConfig {
    fn default() -> Self {
        Self {
            blueprints: [
                "vehicle.audi.a2",
                "vehicle.tesla.model3",
                "vehicle.lincoln.mkz_2020",
                "vehicle.carlamotors.carlacola",
                "vehicle.volkswagen.t2",
                "vehicle.bh.crossbike",
                "vehicle.yamaha.yzf",
                "vehicle.dodge.charger_police",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            landmarks: Vec::new(),
            scripted: Vec::new(),
            fail_spawns: 0,
            muted_channels: Vec::new(),
        }
    }
}

struct MountedSensor {
    sensor: MockSensor,
    parent: VehicleActorId,
    mount: Transform,
    attributes: BTreeMap<String, String>,
}

struct VehicleWorld {
    connected: bool,
    closed: bool,
    frame: u64,
    settings: WorldSettings,
    vehicles: BTreeMap<VehicleActorId, VehicleActor>,
    known: BTreeSet<VehicleActorId>,
    spawned: BTreeSet<VehicleActorId>,
    destroyed: BTreeSet<VehicleActorId>,
    scripted_ids: BTreeMap<usize, VehicleActorId>,
    sensors: BTreeMap<VehicleActorId, MountedSensor>,
    lights: BTreeMap<LandmarkId, TrafficLightState>,
    lights_frozen: bool,
    next_actor_id: VehicleActorId,
}

/// Mock vehicle simulator
///
/// Cheap to clone; clones share the same world.
#[derive(Clone)]
pub struct MockVehicleSim {
    config: Arc<MockVehicleConfig>,
    world: Arc<Mutex<VehicleWorld>>,
    fail_spawns: Arc<AtomicU32>,
    unavailable: Arc<AtomicBool>,
}

impl MockVehicleSim {
    pub fn new(config: MockVehicleConfig) -> Self {
        let lights = config
            .landmarks
            .iter()
            .map(|l| (l.clone(), TrafficLightState::Red))
            .collect();
        let fail_spawns = Arc::new(AtomicU32::new(config.fail_spawns));
        Self {
            config: Arc::new(config),
            world: Arc::new(Mutex::new(VehicleWorld {
                connected: false,
                closed: false,
                frame: 0,
                settings: WorldSettings::default(),
                vehicles: BTreeMap::new(),
                known: BTreeSet::new(),
                spawned: BTreeSet::new(),
                destroyed: BTreeSet::new(),
                scripted_ids: BTreeMap::new(),
                sensors: BTreeMap::new(),
                lights,
                lights_frozen: false,
                // ids start at 1000 so they stand out in logs
                next_actor_id: 1000,
            })),
            fail_spawns,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every later call fails with a connection error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn vehicle_ids(&self) -> BTreeSet<VehicleActorId> {
        lock(&self.world).vehicles.keys().copied().collect()
    }

    pub fn transform_of(&self, id: VehicleActorId) -> Option<Transform> {
        lock(&self.world).vehicles.get(&id).map(|v| v.transform)
    }

    pub fn lights_of(&self, id: VehicleActorId) -> Option<VehicleLights> {
        lock(&self.world).vehicles.get(&id).map(|v| v.lights)
    }

    /// Sensor actors attached to `parent`
    pub fn sensors_on(&self, parent: VehicleActorId) -> Vec<VehicleActorId> {
        lock(&self.world)
            .sensors
            .iter()
            .filter(|(_, m)| m.parent == parent)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn sensor_count(&self) -> usize {
        lock(&self.world).sensors.len()
    }

    pub fn light_state(&self, landmark: &LandmarkId) -> Option<TrafficLightState> {
        lock(&self.world).lights.get(landmark).copied()
    }

    pub fn lights_frozen(&self) -> bool {
        lock(&self.world).lights_frozen
    }

    pub fn settings(&self) -> WorldSettings {
        lock(&self.world).settings
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.world).closed
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SimulatorError::connection(Engine::Vehicle, "rpc timeout"));
        }
        if !lock(&self.world).connected {
            return Err(SimulatorError::connection(Engine::Vehicle, "not connected"));
        }
        Ok(())
    }
}

fn attr_or<T: FromStr>(attributes: &BTreeMap<String, String>, key: &str, default: T) -> T {
    attributes
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_extent(blueprint: &str) -> Extent {
    if blueprint.contains("crossbike") || blueprint.contains("yamaha") {
        Extent::new(1.0, 0.4, 0.8)
    } else if blueprint.contains("carlacola") || blueprint.contains("t2") {
        Extent::new(3.2, 1.2, 1.4)
    } else {
        Extent::new(2.4, 1.0, 0.75)
    }
}

fn mounted_transform(parent: &Transform, mount: &Transform) -> Transform {
    Transform::new(
        Location::new(
            parent.location.x + mount.location.x,
            parent.location.y + mount.location.y,
            parent.location.z + mount.location.z,
        ),
        Rotation::new(
            parent.rotation.pitch + mount.rotation.pitch,
            parent.rotation.yaw + mount.rotation.yaw,
            parent.rotation.roll + mount.rotation.roll,
        ),
    )
}

/// Synthetic payload, never blank
fn synthesize(channel: SensorChannel, attributes: &BTreeMap<String, String>, frame: u64) -> SensorPayload {
    match channel {
        SensorChannel::Camera | SensorChannel::SemanticCamera | SensorChannel::DepthCamera => {
            let width: u32 = attr_or(attributes, "image_size_x", 800);
            let height: u32 = attr_or(attributes, "image_size_y", 600);
            let fov: f32 = attr_or(attributes, "fov", 90.0);
            let format = match channel {
                SensorChannel::SemanticCamera => ImageFormat::SemanticTag,
                SensorChannel::DepthCamera => ImageFormat::Depth,
                _ => ImageFormat::Bgra8,
            };
            let pixels = (width as usize) * (height as usize);
            let mut data = Vec::with_capacity(pixels * 4);
            for i in 0..pixels {
                let shade = ((i as u64 + frame) % 256) as u8;
                match format {
                    ImageFormat::SemanticTag => data.extend_from_slice(&[0, 0, (i % 23) as u8, 255]),
                    _ => data.extend_from_slice(&[shade, shade / 2, 255 - shade, 255]),
                }
            }
            SensorPayload::Image(ImageData {
                width,
                height,
                fov,
                format,
                data: Bytes::from(data),
            })
        }
        SensorChannel::Lidar | SensorChannel::SemanticLidar => {
            let channels: u32 = attr_or(attributes, "channels", 32u32).max(1);
            let pps: u32 = attr_or(attributes, "points_per_second", 56_000);
            let rotation: f32 = attr_or(attributes, "rotation_frequency", 10.0f32).max(1.0);
            let range: f32 = attr_or(attributes, "range", 100.0);
            let per_channel = ((pps as f32 / rotation) as u32 / channels).max(1);
            let semantic = channel == SensorChannel::SemanticLidar;
            let stride: u32 = if semantic { 24 } else { 16 };

            let mut data = Vec::with_capacity((per_channel * channels * stride) as usize);
            for ch in 0..channels {
                let radius = range * (ch + 1) as f32 / (channels + 1) as f32;
                for p in 0..per_channel {
                    let theta = p as f32 / per_channel as f32 * std::f32::consts::TAU;
                    let (x, y, z) = (radius * theta.cos(), radius * theta.sin(), -1.5 + ch as f32 * 0.05);
                    data.extend_from_slice(&x.to_le_bytes());
                    data.extend_from_slice(&y.to_le_bytes());
                    data.extend_from_slice(&z.to_le_bytes());
                    if semantic {
                        data.extend_from_slice(&theta.cos().to_le_bytes());
                        data.extend_from_slice(&(p % 7).to_le_bytes());
                        let tag: u32 = if p % 3 == 0 { 10 } else { 7 };
                        data.extend_from_slice(&tag.to_le_bytes());
                    } else {
                        data.extend_from_slice(&0.5f32.to_le_bytes());
                    }
                }
            }
            SensorPayload::PointCloud(PointCloudData {
                num_points: per_channel * channels,
                point_stride: stride,
                horizontal_angle: (frame as f32 * 0.1) % std::f32::consts::TAU,
                channels,
                points_per_channel: vec![per_channel; channels as usize],
                data: Bytes::from(data),
            })
        }
    }
}

impl VehicleSimulator for MockVehicleSim {
    #[instrument(name = "mock_vehicle_connect", skip(self, endpoint), fields(host = %endpoint.host, port = endpoint.port))]
    async fn connect(&mut self, endpoint: &VehicleEndpoint) -> Result<()> {
        lock(&self.world).connected = true;
        Ok(())
    }

    async fn apply_settings(&self, settings: WorldSettings) -> Result<WorldSettings> {
        self.ensure_available()?;
        let mut world = lock(&self.world);
        Ok(std::mem::replace(&mut world.settings, settings))
    }

    async fn step(&self) -> Result<StepReport> {
        self.ensure_available()?;
        let mut world = lock(&self.world);
        world.frame += 1;
        let frame = world.frame;
        let dt = world.settings.fixed_delta_seconds.unwrap_or(0.05);

        for (index, scripted) in self.config.scripted.iter().enumerate() {
            if scripted.spawn_frame == frame {
                let id = world.next_actor_id;
                world.next_actor_id += 1;
                world.vehicles.insert(
                    id,
                    VehicleActor {
                        id,
                        type_id: scripted.blueprint.clone(),
                        transform: scripted.transform,
                        extent: default_extent(&scripted.blueprint),
                        lights: VehicleLights::default(),
                        color: None,
                    },
                );
                world.scripted_ids.insert(index, id);
            }
            if scripted.destroy_frame == Some(frame) {
                if let Some(id) = world.scripted_ids.remove(&index) {
                    world.vehicles.remove(&id);
                }
            }
        }

        let current: BTreeSet<VehicleActorId> = world.vehicles.keys().copied().collect();
        world.spawned = current.difference(&world.known).copied().collect();
        world.destroyed = world.known.difference(&current).copied().collect();
        world.known = current;

        let timestamp = frame as f64 * dt;
        let mut fired = 0usize;
        for mounted in world.sensors.values() {
            if self.config.muted_channels.contains(&mounted.sensor.channel()) {
                continue;
            }
            let Some(parent) = world.vehicles.get(&mounted.parent) else {
                continue;
            };
            let measurement = SensorMeasurement {
                channel: mounted.sensor.channel(),
                agent: mounted.parent,
                sensor: mounted.sensor.actor_id(),
                frame,
                timestamp,
                sensor_transform: mounted_transform(&parent.transform, &mounted.mount),
                payload: synthesize(mounted.sensor.channel(), &mounted.attributes, frame),
            };
            if mounted.sensor.fire(measurement) {
                fired += 1;
            }
        }
        debug!(frame, fired, "mock vehicle step");

        Ok(StepReport { frame, timestamp })
    }

    async fn spawned(&self) -> Result<BTreeSet<VehicleActorId>> {
        self.ensure_available()?;
        Ok(lock(&self.world).spawned.clone())
    }

    async fn destroyed(&self) -> Result<BTreeSet<VehicleActorId>> {
        self.ensure_available()?;
        Ok(lock(&self.world).destroyed.clone())
    }

    async fn vehicles(&self) -> Result<Vec<VehicleActor>> {
        self.ensure_available()?;
        Ok(lock(&self.world).vehicles.values().cloned().collect())
    }

    async fn actor(&self, id: VehicleActorId) -> Result<Option<VehicleActor>> {
        self.ensure_available()?;
        Ok(lock(&self.world).vehicles.get(&id).cloned())
    }

    fn has_blueprint(&self, blueprint: &str) -> bool {
        self.config.blueprints.iter().any(|b| b == blueprint)
    }

    #[instrument(name = "mock_vehicle_spawn_vehicle", skip(self, transform, color))]
    async fn spawn_vehicle(
        &self,
        blueprint: &str,
        transform: Transform,
        color: Option<Color>,
    ) -> Result<VehicleActorId> {
        self.ensure_available()?;
        if !self.has_blueprint(blueprint) {
            return Err(SimulatorError::spawn_rejected(
                Engine::Vehicle,
                blueprint,
                format!("blueprint '{}' not found", blueprint),
            ));
        }
        if self
            .fail_spawns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SimulatorError::spawn_rejected(Engine::Vehicle, blueprint, "mock failure"));
        }

        let mut world = lock(&self.world);
        let id = world.next_actor_id;
        world.next_actor_id += 1;
        world.vehicles.insert(
            id,
            VehicleActor {
                id,
                type_id: blueprint.to_string(),
                transform,
                extent: default_extent(blueprint),
                lights: VehicleLights::default(),
                color,
            },
        );
        Ok(id)
    }

    #[instrument(name = "mock_vehicle_destroy_actor", skip(self), fields(actor_id = id))]
    async fn destroy_actor(&self, id: VehicleActorId) -> Result<()> {
        self.ensure_available()?;
        let mut world = lock(&self.world);
        if let Some(mounted) = world.sensors.remove(&id) {
            mounted.sensor.stop();
        }
        // Idempotent: unknown ids are Ok
        world.vehicles.remove(&id);
        Ok(())
    }

    async fn set_transform(
        &self,
        id: VehicleActorId,
        transform: Transform,
        lights: Option<VehicleLights>,
    ) -> Result<()> {
        self.ensure_available()?;
        let mut world = lock(&self.world);
        let vehicle = world
            .vehicles
            .get_mut(&id)
            .ok_or_else(|| SimulatorError::actor_not_found(Engine::Vehicle, id))?;
        vehicle.transform = transform;
        if let Some(lights) = lights {
            vehicle.lights = lights;
        }
        Ok(())
    }

    async fn traffic_light_landmarks(&self) -> Result<BTreeSet<LandmarkId>> {
        self.ensure_available()?;
        Ok(lock(&self.world).lights.keys().cloned().collect())
    }

    async fn traffic_light_state(&self, landmark: &LandmarkId) -> Result<Option<TrafficLightState>> {
        self.ensure_available()?;
        Ok(lock(&self.world).lights.get(landmark).copied())
    }

    async fn set_traffic_light_state(&self, landmark: &LandmarkId, state: TrafficLightState) -> Result<bool> {
        self.ensure_available()?;
        let mut world = lock(&self.world);
        match world.lights.get_mut(landmark) {
            Some(light) => {
                *light = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn freeze_traffic_lights(&self, freeze: bool) -> Result<()> {
        self.ensure_available()?;
        lock(&self.world).lights_frozen = freeze;
        Ok(())
    }

    #[instrument(name = "mock_vehicle_spawn_sensor", skip(self, transform, attributes))]
    async fn spawn_sensor(
        &self,
        channel: SensorChannel,
        transform: Transform,
        parent: VehicleActorId,
        attributes: &BTreeMap<String, String>,
    ) -> Result<VehicleActorId> {
        self.ensure_available()?;
        let mut world = lock(&self.world);
        if !world.vehicles.contains_key(&parent) {
            return Err(SimulatorError::actor_not_found(Engine::Vehicle, parent));
        }
        let id = world.next_actor_id;
        world.next_actor_id += 1;
        world.sensors.insert(
            id,
            MountedSensor {
                sensor: MockSensor::new(id, channel),
                parent,
                mount: transform,
                attributes: attributes.clone(),
            },
        );
        Ok(id)
    }

    fn sensor_source(&self, actor_id: VehicleActorId) -> Option<Box<dyn SensorSource>> {
        lock(&self.world)
            .sensors
            .get(&actor_id)
            .map(|m| Box::new(m.sensor.clone()) as Box<dyn SensorSource>)
    }

    async fn close(&self) -> Result<()> {
        let mut world = lock(&self.world);
        for mounted in world.sensors.values() {
            mounted.sensor.stop();
        }
        world.closed = true;
        world.connected = false;
        Ok(())
    }
}
