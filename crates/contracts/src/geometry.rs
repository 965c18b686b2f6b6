//! Geometry shared by both simulators
//!
//! Units: meters for locations and extents, degrees for rotations.

use serde::{Deserialize, Serialize};

/// 3D transform: location + rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub rotation: Rotation,
}

impl Transform {
    pub fn new(location: Location, rotation: Rotation) -> Self {
        Self { location, rotation }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Rotation {
    pub fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }
}

/// Half-size bounding box extent (x = half length, y = half width, z = half height)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Extent {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Full (length, width, height)
    pub fn full_size(&self) -> (f64, f64, f64) {
        (self.x * 2.0, self.y * 2.0, self.z * 2.0)
    }
}

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const RED: Color = Color::rgba(255, 0, 0, 255);
    pub const MAGENTA: Color = Color::rgba(255, 0, 255, 255);
    pub const GREEN: Color = Color::rgba(0, 255, 0, 255);
    pub const YELLOW: Color = Color::rgba(255, 255, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Blueprint attribute form "r,g,b"
    pub fn to_attribute(&self) -> String {
        format!("{},{},{}", self.r, self.g, self.b)
    }

    /// Parse "r,g,b" or "r,g,b,a"
    pub fn parse_attribute(value: &str) -> Option<Self> {
        let parts: Vec<u8> = value
            .split(',')
            .map(|p| p.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [r, g, b] => Some(Self::rgba(*r, *g, *b, 255)),
            [r, g, b, a] => Some(Self::rgba(*r, *g, *b, *a)),
            _ => None,
        }
    }
}
