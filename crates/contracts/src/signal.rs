//! Traffic-light vocabulary
//!
//! The traffic simulator addresses signals as (controller, link index) with one
//! character per link. The vehicle simulator addresses them by landmark.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Program id reported by a controller that another client drives
pub const EXTERNAL_PROGRAM_ID: &str = "online";

/// Logical traffic-control point, shared by both simulators
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkId(pub String);

impl LandmarkId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LandmarkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-link signal state of the traffic simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkState {
    /// 'r'
    Red,
    /// 'y'
    Yellow,
    /// 'G'
    Green,
    /// 'g'
    GreenWithoutPriority,
    /// 's'
    GreenRightTurn,
    /// 'u'
    RedYellow,
    /// 'o'
    OffBlinking,
    /// 'O'
    Off,
}

impl LinkState {
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'r' => Self::Red,
            'y' => Self::Yellow,
            'G' => Self::Green,
            'g' => Self::GreenWithoutPriority,
            's' => Self::GreenRightTurn,
            'u' => Self::RedYellow,
            'o' => Self::OffBlinking,
            'O' => Self::Off,
            _ => return None,
        })
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Red => 'r',
            Self::Yellow => 'y',
            Self::Green => 'G',
            Self::GreenWithoutPriority => 'g',
            Self::GreenRightTurn => 's',
            Self::RedYellow => 'u',
            Self::OffBlinking => 'o',
            Self::Off => 'O',
        }
    }
}

/// Landmark traffic-light state of the vehicle simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLightState {
    Red,
    Yellow,
    Green,
    Off,
    Unknown,
}

/// One controller program as reported at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerProgram {
    pub controller_id: String,
    pub program_id: String,
    /// Ordered phase strings, one character per link
    pub phases: Vec<String>,
    /// Link index -> landmark
    pub landmark_links: BTreeMap<usize, LandmarkId>,
}

/// Program and phase a controller is currently running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub program_id: String,
    pub phase_index: usize,
}

impl ControllerStatus {
    /// Controller is driven by another client
    pub fn is_external(&self) -> bool {
        self.program_id == EXTERNAL_PROGRAM_ID
    }
}
