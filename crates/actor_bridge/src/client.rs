//! Simulator client abstraction
//!
//! One trait per engine. Real clients and the in-process mocks implement the
//! same surface, so the synchronization loop never knows which one it drives.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use contracts::{
    Color, ControllerProgram, ControllerStatus, LandmarkId, LinkState, Location, SensorChannel,
    SensorSource, TrafficActor, TrafficActorId, TrafficEndpoint, TrafficLightState, Transform,
    VehicleActor, VehicleActorId, VehicleClass, VehicleEndpoint, VehicleLights, VehicleSignals,
};

use crate::error::Result;

/// Outcome of one engine step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub frame: u64,
    /// Simulation time (seconds)
    pub timestamp: f64,
}

/// Vehicle simulator world settings
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldSettings {
    pub synchronous_mode: bool,
    pub fixed_delta_seconds: Option<f64>,
}

/// Agent reported by the traffic simulator's proximity query
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: TrafficActorId,
    pub location: Location,
    pub vclass: VehicleClass,
}

/// Traffic micro-simulator client
pub trait TrafficSimulator: Send + Sync {
    /// Connect to the traffic simulator
    fn connect(&mut self, endpoint: &TrafficEndpoint) -> impl Future<Output = Result<()>> + Send;

    /// Advance one fixed step
    fn step(&self) -> impl Future<Output = Result<StepReport>> + Send;

    /// Agents that departed during the last step
    fn spawned(&self) -> impl Future<Output = Result<BTreeSet<TrafficActorId>>> + Send;

    /// Agents that arrived or were removed during the last step
    fn destroyed(&self) -> impl Future<Output = Result<BTreeSet<TrafficActorId>>> + Send;

    /// Snapshot of one agent, `None` if it no longer exists
    fn actor(
        &self,
        id: &TrafficActorId,
    ) -> impl Future<Output = Result<Option<TrafficActor>>> + Send;

    /// Insert an externally driven agent of `type_id`
    fn spawn_actor(
        &self,
        type_id: &str,
        color: Option<Color>,
    ) -> impl Future<Output = Result<TrafficActorId>> + Send;

    /// Idempotent: removing an unknown agent is Ok
    fn destroy_actor(&self, id: &TrafficActorId) -> impl Future<Output = Result<()>> + Send;

    /// Move an agent to a front-bumper referenced transform
    fn set_transform(
        &self,
        id: &TrafficActorId,
        transform: Transform,
        signals: Option<VehicleSignals>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_color(&self, id: &TrafficActorId, color: Color) -> impl Future<Output = Result<()>> + Send;

    /// Agents within `radius` of `ego` on the ground plane, ego included.
    ///
    /// Empty when ego is not in the simulation.
    fn neighbors(
        &self,
        ego: &TrafficActorId,
        radius: f64,
    ) -> impl Future<Output = Result<Vec<Neighbor>>> + Send;

    /// Every program of every signal controller
    fn controller_programs(&self) -> impl Future<Output = Result<Vec<ControllerProgram>>> + Send;

    /// Program and phase a controller currently runs
    fn controller_status(
        &self,
        controller_id: &str,
    ) -> impl Future<Output = Result<ControllerStatus>> + Send;

    fn set_link_state(
        &self,
        controller_id: &str,
        link_index: usize,
        state: LinkState,
    ) -> impl Future<Output = Result<()>> + Send;

    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// 3D vehicle/sensor simulator client
pub trait VehicleSimulator: Send + Sync {
    /// Connect to the vehicle simulator
    fn connect(&mut self, endpoint: &VehicleEndpoint) -> impl Future<Output = Result<()>> + Send;

    /// Apply world settings, returning the previous ones
    fn apply_settings(
        &self,
        settings: WorldSettings,
    ) -> impl Future<Output = Result<WorldSettings>> + Send;

    /// Advance one fixed step (synchronous mode tick)
    fn step(&self) -> impl Future<Output = Result<StepReport>> + Send;

    /// Vehicles that appeared during the last step. Sensors are never reported.
    fn spawned(&self) -> impl Future<Output = Result<BTreeSet<VehicleActorId>>> + Send;

    /// Vehicles that disappeared during the last step
    fn destroyed(&self) -> impl Future<Output = Result<BTreeSet<VehicleActorId>>> + Send;

    /// Every live vehicle
    fn vehicles(&self) -> impl Future<Output = Result<Vec<VehicleActor>>> + Send;

    /// Snapshot of one vehicle, `None` if it no longer exists
    fn actor(
        &self,
        id: VehicleActorId,
    ) -> impl Future<Output = Result<Option<VehicleActor>>> + Send;

    /// Blueprint library lookup
    fn has_blueprint(&self, blueprint: &str) -> bool;

    /// Spawn a vehicle with physics disabled
    fn spawn_vehicle(
        &self,
        blueprint: &str,
        transform: Transform,
        color: Option<Color>,
    ) -> impl Future<Output = Result<VehicleActorId>> + Send;

    /// Idempotent: destroying an unknown actor is Ok
    fn destroy_actor(&self, id: VehicleActorId) -> impl Future<Output = Result<()>> + Send;

    /// Teleport a vehicle to a center referenced transform
    fn set_transform(
        &self,
        id: VehicleActorId,
        transform: Transform,
        lights: Option<VehicleLights>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn traffic_light_landmarks(&self) -> impl Future<Output = Result<BTreeSet<LandmarkId>>> + Send;

    fn traffic_light_state(
        &self,
        landmark: &LandmarkId,
    ) -> impl Future<Output = Result<Option<TrafficLightState>>> + Send;

    /// Returns false for an unknown landmark
    fn set_traffic_light_state(
        &self,
        landmark: &LandmarkId,
        state: TrafficLightState,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Stop (or resume) the engine's own light cycling
    fn freeze_traffic_lights(&self, freeze: bool) -> impl Future<Output = Result<()>> + Send;

    /// Spawn a sensor attached to `parent`
    ///
    /// # Arguments
    /// * `transform` - Pose relative to the parent vehicle
    fn spawn_sensor(
        &self,
        channel: SensorChannel,
        transform: Transform,
        parent: VehicleActorId,
        attributes: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<VehicleActorId>> + Send;

    /// Stream handle of a spawned sensor, `None` if the actor is not a sensor
    fn sensor_source(&self, actor_id: VehicleActorId) -> Option<Box<dyn SensorSource>>;

    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}
