//! Actor snapshots as reported by each simulator

use serde::{Deserialize, Serialize};

use crate::{Color, Extent, Transform, VehicleActorId};

/// Vehicle class reported by the traffic simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    #[default]
    Passenger,
    Bicycle,
    Motorcycle,
    Bus,
    Truck,
    Emergency,
    Other,
}

impl VehicleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passenger => "passenger",
            Self::Bicycle => "bicycle",
            Self::Motorcycle => "motorcycle",
            Self::Bus => "bus",
            Self::Truck => "truck",
            Self::Emergency => "emergency",
            Self::Other => "other",
        }
    }
}

/// Traffic simulator vehicle signal bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleSignals(pub u32);

impl VehicleSignals {
    pub const BLINKER_RIGHT: u32 = 1 << 0;
    pub const BLINKER_LEFT: u32 = 1 << 1;
    pub const BLINKER_EMERGENCY: u32 = 1 << 2;
    pub const BRAKELIGHT: u32 = 1 << 3;
    pub const FRONTLIGHT: u32 = 1 << 4;
    pub const FOGLIGHT: u32 = 1 << 5;
    pub const HIGHBEAM: u32 = 1 << 6;
    pub const BACKDRIVE: u32 = 1 << 7;
    pub const WIPER: u32 = 1 << 8;
    pub const DOOR_OPEN_LEFT: u32 = 1 << 9;
    pub const DOOR_OPEN_RIGHT: u32 = 1 << 10;
    pub const EMERGENCY_BLUE: u32 = 1 << 11;
    pub const EMERGENCY_RED: u32 = 1 << 12;
    pub const EMERGENCY_YELLOW: u32 = 1 << 13;

    #[inline]
    pub fn has(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    #[inline]
    pub fn toggle(&mut self, bit: u32) {
        self.0 ^= bit;
    }
}

/// Vehicle simulator light state bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleLights(pub u32);

impl VehicleLights {
    pub const POSITION: u32 = 0x1;
    pub const LOW_BEAM: u32 = 0x2;
    pub const HIGH_BEAM: u32 = 0x4;
    pub const BRAKE: u32 = 0x8;
    pub const RIGHT_BLINKER: u32 = 0x10;
    pub const LEFT_BLINKER: u32 = 0x20;
    pub const REVERSE: u32 = 0x40;
    pub const FOG: u32 = 0x80;
    pub const INTERIOR: u32 = 0x100;
    pub const SPECIAL1: u32 = 0x200;
    pub const SPECIAL2: u32 = 0x400;

    #[inline]
    pub fn has(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    #[inline]
    pub fn toggle(&mut self, bit: u32) {
        self.0 ^= bit;
    }
}

/// Traffic simulator view of one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficActor {
    /// Vehicle type id (vtype)
    pub type_id: String,
    pub vclass: VehicleClass,
    /// Front-bumper referenced transform
    pub transform: Transform,
    pub extent: Extent,
    pub signals: VehicleSignals,
    pub color: Option<Color>,
}

/// Vehicle simulator view of one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleActor {
    pub id: VehicleActorId,
    /// Blueprint id, e.g. "vehicle.tesla.model3"
    pub type_id: String,
    /// Center referenced transform
    pub transform: Transform,
    pub extent: Extent,
    pub lights: VehicleLights,
    pub color: Option<Color>,
}
