//! CosimConfig - Config Loader output
//!
//! Resolved configuration of one co-simulation run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::{Location, Rotation, SensorChannel, TrafficActorId, Transform, VehicleClass};

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosimConfig {
    /// Traffic simulator endpoint
    #[serde(default)]
    pub traffic: TrafficEndpoint,

    /// Vehicle simulator endpoint
    #[serde(default)]
    pub vehicle: VehicleEndpoint,

    /// Fixed step length in seconds
    #[serde(default = "default_step_length")]
    pub step_length: f64,

    #[serde(default)]
    pub sync: SyncOptions,

    #[serde(default)]
    pub perception: PerceptionConfig,

    #[serde(default)]
    pub sensors: SensorRigConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for CosimConfig {
    fn default() -> Self {
        Self {
            traffic: TrafficEndpoint::default(),
            vehicle: VehicleEndpoint::default(),
            step_length: default_step_length(),
            sync: SyncOptions::default(),
            perception: PerceptionConfig::default(),
            sensors: SensorRigConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

fn default_step_length() -> f64 {
    0.1
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficEndpoint {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_traffic_port")]
    pub port: u16,
    /// Client order when several clients share the traffic simulator
    #[serde(default = "default_client_order")]
    pub client_order: u32,
}

impl Default for TrafficEndpoint {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_traffic_port(),
            client_order: default_client_order(),
        }
    }
}

fn default_traffic_port() -> u16 {
    8813
}

fn default_client_order() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleEndpoint {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_vehicle_port")]
    pub port: u16,
    /// Client RPC timeout in seconds
    #[serde(default = "default_vehicle_timeout")]
    pub timeout_sec: f64,
}

impl Default for VehicleEndpoint {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_vehicle_port(),
            timeout_sec: default_vehicle_timeout(),
        }
    }
}

fn default_vehicle_port() -> u16 {
    2000
}

fn default_vehicle_timeout() -> f64 {
    60.0
}

/// Which simulator is the source of truth for mirrored vehicle transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    #[default]
    TrafficToVehicle,
    VehicleToTraffic,
}

/// Which simulator owns the traffic-light programs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsManager {
    #[default]
    None,
    Traffic,
    Vehicle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    #[serde(default)]
    pub vehicle_direction: SyncDirection,

    #[serde(default)]
    pub tls_manager: TlsManager,

    /// Carry vehicle light/signal state with the transform
    #[serde(default)]
    pub sync_vehicle_lights: bool,

    /// Carry vehicle color into mirror spawns
    #[serde(default)]
    pub sync_vehicle_color: bool,

    /// Color agents in the traffic simulator by perception role
    #[serde(default)]
    pub highlight_roles: bool,

    /// Traffic network offset (x, y) relative to the vehicle simulator map
    #[serde(default)]
    pub net_offset: [f64; 2],

    /// Mirror spawn attempts before an actor is dropped from sync
    #[serde(default = "default_max_spawn_retries")]
    pub max_spawn_retries: u32,

    /// JSON vtype -> blueprint mapping file
    #[serde(default)]
    pub vtypes_path: Option<PathBuf>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            vehicle_direction: SyncDirection::default(),
            tls_manager: TlsManager::default(),
            sync_vehicle_lights: false,
            sync_vehicle_color: false,
            highlight_roles: false,
            net_offset: [0.0, 0.0],
            max_spawn_retries: default_max_spawn_retries(),
            vtypes_path: None,
        }
    }
}

fn default_max_spawn_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    /// Traffic simulator id of the ego agent
    #[serde(default = "default_ego_id")]
    pub ego_id: TrafficActorId,

    /// Communication radius around ego (meters, ground plane)
    #[serde(default = "default_comm_range")]
    pub comm_range: f64,

    /// Maximum perception subset size, ego included
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Active ticks before an empty neighborhood ends the run
    #[serde(default = "default_grace_ticks")]
    pub grace_ticks: u64,

    /// Active ticks before the run ends regardless of neighbors
    #[serde(default = "default_max_active_ticks")]
    pub max_active_ticks: u64,

    #[serde(default)]
    pub range_policy: RangePolicy,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            ego_id: default_ego_id(),
            comm_range: default_comm_range(),
            sample_size: default_sample_size(),
            grace_ticks: default_grace_ticks(),
            max_active_ticks: default_max_active_ticks(),
            range_policy: RangePolicy::default(),
        }
    }
}

fn default_ego_id() -> TrafficActorId {
    "0".into()
}

fn default_comm_range() -> f64 {
    50.0
}

fn default_sample_size() -> usize {
    5
}

fn default_grace_ticks() -> u64 {
    150
}

fn default_max_active_ticks() -> u64 {
    800
}

/// Which in-range agents count as perception candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangePolicy {
    /// Vehicle classes never considered
    #[serde(default = "default_excluded_classes")]
    pub excluded_classes: Vec<VehicleClass>,

    /// Agents whose id parses to a number below this value are excluded
    #[serde(default)]
    pub numeric_id_ceiling: Option<u64>,
}

impl Default for RangePolicy {
    fn default() -> Self {
        Self {
            excluded_classes: default_excluded_classes(),
            numeric_id_ceiling: None,
        }
    }
}

fn default_excluded_classes() -> Vec<VehicleClass> {
    vec![VehicleClass::Bicycle, VehicleClass::Motorcycle]
}

impl RangePolicy {
    pub fn admits(&self, id: &TrafficActorId, vclass: VehicleClass) -> bool {
        if self.excluded_classes.contains(&vclass) {
            return false;
        }
        match (self.numeric_id_ceiling, id.numeric()) {
            (Some(ceiling), Some(n)) => n >= ceiling,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorRigConfig {
    /// Bounded wait per channel per tick
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Sensor bundle mounted on every perception agent
    #[serde(default = "default_riders")]
    pub riders: Vec<RiderSpec>,
}

impl Default for SensorRigConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
            riders: default_riders(),
        }
    }
}

fn default_drain_timeout_ms() -> u64 {
    60_000
}

fn default_riders() -> Vec<RiderSpec> {
    let camera_attrs: BTreeMap<String, String> = [
        ("image_size_x", "800"),
        ("image_size_y", "600"),
        ("fov", "90"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let lidar_attrs: BTreeMap<String, String> = [
        ("channels", "32"),
        ("range", "100"),
        ("points_per_second", "56000"),
        ("rotation_frequency", "10"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let camera_mount = Transform::new(Location::new(0.0, 0.0, 0.3), Rotation::default());
    let lidar_mount = Transform::new(Location::new(0.0, 0.0, 0.5), Rotation::default());

    vec![
        RiderSpec::new(SensorChannel::Camera, camera_mount, camera_attrs.clone()),
        RiderSpec::new(SensorChannel::SemanticCamera, camera_mount, camera_attrs),
        RiderSpec::new(SensorChannel::Lidar, lidar_mount, lidar_attrs.clone()),
        RiderSpec::new(SensorChannel::SemanticLidar, lidar_mount, lidar_attrs),
    ]
}

/// One sensor of the bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderSpec {
    pub channel: SensorChannel,

    /// Mount pose relative to the vehicle roof
    #[serde(default)]
    pub transform: Transform,

    /// Blueprint attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl RiderSpec {
    pub fn new(
        channel: SensorChannel,
        transform: Transform,
        attributes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            channel,
            transform,
            attributes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory of the run output
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Skip payloads the engine delivered before rendering anything
    #[serde(default = "default_true")]
    pub skip_blank_payloads: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            skip_blank_payloads: true,
        }
    }
}

fn default_root_path() -> PathBuf {
    PathBuf::from("output")
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: CosimConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.step_length, 0.1);
        assert_eq!(config.perception.ego_id, "0");
        assert_eq!(config.perception.comm_range, 50.0);
        assert_eq!(config.perception.sample_size, 5);
        assert_eq!(config.perception.grace_ticks, 150);
        assert_eq!(config.perception.max_active_ticks, 800);
        assert_eq!(config.sync.tls_manager, TlsManager::None);
        assert_eq!(config.sensors.riders.len(), 4);
        assert_eq!(config.sensors.drain_timeout_ms, 60_000);
    }

    #[test]
    fn test_range_policy_excludes_classes() {
        let policy = RangePolicy::default();
        let id: TrafficActorId = "7".into();
        assert!(policy.admits(&id, VehicleClass::Passenger));
        assert!(!policy.admits(&id, VehicleClass::Bicycle));
        assert!(!policy.admits(&id, VehicleClass::Motorcycle));
    }

    #[test]
    fn test_range_policy_numeric_ceiling() {
        let policy = RangePolicy {
            excluded_classes: vec![],
            numeric_id_ceiling: Some(50),
        };
        assert!(!policy.admits(&"49".into(), VehicleClass::Passenger));
        assert!(policy.admits(&"50".into(), VehicleClass::Passenger));
        assert!(policy.admits(&"carla1".into(), VehicleClass::Passenger));
    }

    #[test]
    fn test_unknown_sensor_channel_rejected() {
        let doc = r#"{"sensors": {"riders": [{"channel": "sonar"}]}}"#;
        assert!(serde_json::from_str::<CosimConfig>(doc).is_err());
    }
}
