//! Conversions between the two simulators
//!
//! Traffic simulator: right-handed, vehicle reference point at the front bumper,
//! yaw measured clockwise from north. Vehicle simulator: left-handed, reference
//! point at the bounding box center.

use std::collections::BTreeMap;
use std::path::Path;

use contracts::{
    CosimError, Extent, LinkState, Location, Rotation, TrafficActor, TrafficLightState, Transform,
    VehicleClass, VehicleLights, VehicleSignals,
};
use serde::Deserialize;
use tracing::debug;

/// Mirrors are spawned this far above their target and dropped into place by
/// the first transform update
pub const SPAWN_OFFSET_Z: f64 = 25.0;

/// Traffic network offset relative to the vehicle simulator map
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetOffset {
    pub x: f64,
    pub y: f64,
}

impl From<[f64; 2]> for NetOffset {
    fn from(v: [f64; 2]) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

/// Traffic simulator transform -> vehicle simulator transform
pub fn to_vehicle_transform(transform: &Transform, extent: &Extent, offset: NetOffset) -> Transform {
    let loc = transform.location;
    let rot = transform.rotation;

    let yaw = (-rot.yaw + 90.0).to_radians();
    let pitch = rot.pitch.to_radians();
    let x = loc.x - yaw.cos() * extent.x - offset.x;
    let y = loc.y - yaw.sin() * extent.x - offset.y;
    let z = loc.z - pitch.sin() * extent.x;

    Transform::new(
        Location::new(x, -y, z),
        Rotation::new(rot.pitch, rot.yaw - 90.0, rot.roll),
    )
}

/// Vehicle simulator transform -> traffic simulator transform
pub fn to_traffic_transform(transform: &Transform, extent: &Extent, offset: NetOffset) -> Transform {
    let loc = transform.location;
    let rot = transform.rotation;

    let yaw = (-rot.yaw).to_radians();
    let pitch = rot.pitch.to_radians();
    let x = loc.x + yaw.cos() * extent.x + offset.x;
    let y = loc.y - yaw.sin() * extent.x - offset.y;
    let z = loc.z - pitch.sin() * extent.x;

    Transform::new(
        Location::new(x, -y, z),
        Rotation::new(rot.pitch, rot.yaw + 90.0, rot.roll),
    )
}

/// Raise a spawn transform by [`SPAWN_OFFSET_Z`]
pub fn spawn_transform(transform: &Transform) -> Transform {
    let mut raised = *transform;
    raised.location.z += SPAWN_OFFSET_Z;
    raised
}

/// Merge traffic simulator signals into the current vehicle light state
pub fn to_vehicle_lights(current: VehicleLights, signals: VehicleSignals) -> VehicleLights {
    let mut lights = current;
    let mut sync = |wanted: bool, bit: u32| {
        if wanted != lights.has(bit) {
            lights.toggle(bit);
        }
    };

    let emergency = signals.has(VehicleSignals::BLINKER_EMERGENCY);
    sync(
        signals.has(VehicleSignals::BLINKER_RIGHT) || emergency,
        VehicleLights::RIGHT_BLINKER,
    );
    sync(
        signals.has(VehicleSignals::BLINKER_LEFT) || emergency,
        VehicleLights::LEFT_BLINKER,
    );
    sync(signals.has(VehicleSignals::BRAKELIGHT), VehicleLights::BRAKE);
    sync(signals.has(VehicleSignals::FRONTLIGHT), VehicleLights::LOW_BEAM);
    sync(signals.has(VehicleSignals::FOGLIGHT), VehicleLights::FOG);
    sync(signals.has(VehicleSignals::HIGHBEAM), VehicleLights::HIGH_BEAM);
    sync(signals.has(VehicleSignals::BACKDRIVE), VehicleLights::REVERSE);
    sync(
        signals.has(VehicleSignals::DOOR_OPEN_LEFT) || signals.has(VehicleSignals::DOOR_OPEN_RIGHT),
        VehicleLights::POSITION,
    );
    lights
}

/// Merge vehicle simulator lights into the current traffic signal state
pub fn to_traffic_signals(current: VehicleSignals, lights: VehicleLights) -> VehicleSignals {
    let mut signals = current;
    let mut sync = |wanted: bool, bit: u32| {
        if wanted != signals.has(bit) {
            signals.toggle(bit);
        }
    };

    let right = lights.has(VehicleLights::RIGHT_BLINKER);
    let left = lights.has(VehicleLights::LEFT_BLINKER);
    sync(right, VehicleSignals::BLINKER_RIGHT);
    sync(left, VehicleSignals::BLINKER_LEFT);
    sync(right && left, VehicleSignals::BLINKER_EMERGENCY);
    sync(lights.has(VehicleLights::BRAKE), VehicleSignals::BRAKELIGHT);
    sync(lights.has(VehicleLights::LOW_BEAM), VehicleSignals::FRONTLIGHT);
    sync(lights.has(VehicleLights::FOG), VehicleSignals::FOGLIGHT);
    sync(lights.has(VehicleLights::HIGH_BEAM), VehicleSignals::HIGHBEAM);
    sync(lights.has(VehicleLights::REVERSE), VehicleSignals::BACKDRIVE);
    signals
}

pub fn to_vehicle_light_state(state: LinkState) -> TrafficLightState {
    match state {
        LinkState::Red | LinkState::RedYellow => TrafficLightState::Red,
        LinkState::Yellow => TrafficLightState::Yellow,
        LinkState::Green | LinkState::GreenWithoutPriority => TrafficLightState::Green,
        LinkState::Off => TrafficLightState::Off,
        LinkState::GreenRightTurn | LinkState::OffBlinking => TrafficLightState::Unknown,
    }
}

pub fn to_link_state(state: TrafficLightState) -> LinkState {
    match state {
        TrafficLightState::Red => LinkState::Red,
        TrafficLightState::Yellow => LinkState::Yellow,
        TrafficLightState::Green => LinkState::Green,
        TrafficLightState::Off | TrafficLightState::Unknown => LinkState::Off,
    }
}

#[derive(Debug, Deserialize)]
struct VtypeFile {
    carla_blueprints: BTreeMap<String, VtypeEntry>,
}

#[derive(Debug, Deserialize)]
struct VtypeEntry {
    #[serde(rename = "vClass", default)]
    vclass: VehicleClass,
}

/// Vehicle type <-> blueprint mapping
///
/// Traffic vehicle types are named after blueprints. Types without a matching
/// blueprint fall back to the first known blueprint of the same vehicle class.
#[derive(Debug, Clone)]
pub struct BlueprintCatalog {
    blueprints: BTreeMap<String, VehicleClass>,
}

impl Default for BlueprintCatalog {
    fn default() -> Self {
        let blueprints = [
            ("vehicle.audi.a2", VehicleClass::Passenger),
            ("vehicle.tesla.model3", VehicleClass::Passenger),
            ("vehicle.lincoln.mkz_2020", VehicleClass::Passenger),
            ("vehicle.carlamotors.carlacola", VehicleClass::Truck),
            ("vehicle.volkswagen.t2", VehicleClass::Bus),
            ("vehicle.bh.crossbike", VehicleClass::Bicycle),
            ("vehicle.yamaha.yzf", VehicleClass::Motorcycle),
            ("vehicle.dodge.charger_police", VehicleClass::Emergency),
        ]
        .into_iter()
        .map(|(bp, class)| (bp.to_string(), class))
        .collect();
        Self { blueprints }
    }
}

impl BlueprintCatalog {
    /// Parse `{"carla_blueprints": {"<blueprint>": {"vClass": "<class>"}}}`
    pub fn from_json(content: &str) -> Result<Self, CosimError> {
        let file: VtypeFile = serde_json::from_str(content)
            .map_err(|e| CosimError::configuration("sync.vtypes_path", e.to_string()))?;
        let blueprints = file
            .carla_blueprints
            .into_iter()
            .map(|(bp, entry)| (bp, entry.vclass))
            .collect();
        Ok(Self { blueprints })
    }

    pub fn load(path: &Path) -> Result<Self, CosimError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CosimError::configuration(
                "sync.vtypes_path",
                format!("failed to read '{}': {}", path.display(), e),
            )
        })?;
        Self::from_json(&content)
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }

    /// Blueprint for a traffic agent, `None` if nothing suitable is available
    pub fn blueprint_for(
        &self,
        actor: &TrafficActor,
        available: impl Fn(&str) -> bool,
    ) -> Option<String> {
        if available(&actor.type_id) {
            return Some(actor.type_id.clone());
        }
        let fallback = self
            .blueprints
            .iter()
            .find(|(bp, class)| **class == actor.vclass && available(bp))
            .map(|(bp, _)| bp.clone());
        debug!(type_id = %actor.type_id, fallback = ?fallback, "no blueprint named after vehicle type");
        fallback
    }

    /// Traffic vehicle type for a vehicle simulator blueprint
    pub fn vtype_for(&self, blueprint: &str) -> Option<String> {
        self.blueprints
            .contains_key(blueprint)
            .then(|| blueprint.to_string())
    }
}
