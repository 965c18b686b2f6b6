//! Sensor channels and measurements
//!
//! Every supported channel is a variant of [`SensorChannel`]; blueprint, payload
//! kind and on-disk layout hang off the variant.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Transform, VehicleActorId};

/// Supported sensor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorChannel {
    #[serde(rename = "camera")]
    Camera,
    #[serde(rename = "camera_sem")]
    SemanticCamera,
    #[serde(rename = "camera_depth")]
    DepthCamera,
    #[serde(rename = "lidar")]
    Lidar,
    #[serde(rename = "lidar_sem")]
    SemanticLidar,
}

/// Payload family produced by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Image,
    PointCloud,
}

impl SensorChannel {
    pub const ALL: [SensorChannel; 5] = [
        SensorChannel::Camera,
        SensorChannel::SemanticCamera,
        SensorChannel::DepthCamera,
        SensorChannel::Lidar,
        SensorChannel::SemanticLidar,
    ];

    /// Vehicle simulator blueprint
    pub fn blueprint(&self) -> &'static str {
        match self {
            Self::Camera => "sensor.camera.rgb",
            Self::SemanticCamera => "sensor.camera.semantic_segmentation",
            Self::DepthCamera => "sensor.camera.depth",
            Self::Lidar => "sensor.lidar.ray_cast",
            Self::SemanticLidar => "sensor.lidar.ray_cast_semantic",
        }
    }

    /// Directory name under each agent's output folder
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::SemanticCamera => "camera_sem",
            Self::DepthCamera => "camera_depth",
            Self::Lidar => "lidar",
            Self::SemanticLidar => "lidar_sem",
        }
    }

    pub fn payload_kind(&self) -> PayloadKind {
        match self {
            Self::Camera | Self::SemanticCamera | Self::DepthCamera => PayloadKind::Image,
            Self::Lidar | Self::SemanticLidar => PayloadKind::PointCloud,
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self.payload_kind() {
            PayloadKind::Image => "png",
            PayloadKind::PointCloud => "ply",
        }
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// One sensor output delivered by the vehicle simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorMeasurement {
    pub channel: SensorChannel,
    /// Vehicle the sensor rides on
    pub agent: VehicleActorId,
    /// Sensor actor
    pub sensor: VehicleActorId,
    pub frame: u64,
    /// Simulation time (seconds)
    pub timestamp: f64,
    /// World transform of the sensor when the measurement was taken
    pub sensor_transform: Transform,
    pub payload: SensorPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SensorPayload {
    Image(ImageData),
    PointCloud(PointCloudData),
}

impl SensorPayload {
    /// Engine has not rendered anything yet
    pub fn is_blank(&self) -> bool {
        let data = match self {
            Self::Image(img) => &img.data,
            Self::PointCloud(pc) => &pc.data,
        };
        data.iter().all(|b| *b == 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// Horizontal field of view (degrees)
    pub fov: f32,
    pub format: ImageFormat,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// Raw engine output, 4 bytes per pixel
    Bgra8,
    /// Semantic tag in the red byte of each BGRA pixel
    SemanticTag,
    /// Depth encoded in the BGR bytes of each BGRA pixel
    Depth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudData {
    pub num_points: u32,
    /// Bytes per point: 16 for (x, y, z, intensity), 24 for semantic points
    pub point_stride: u32,
    /// Horizontal angle of the scan (radians)
    pub horizontal_angle: f32,
    pub channels: u32,
    pub points_per_channel: Vec<u32>,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names_deserialize() {
        let ch: SensorChannel = serde_json::from_str("\"camera_sem\"").unwrap();
        assert_eq!(ch, SensorChannel::SemanticCamera);
        assert!(serde_json::from_str::<SensorChannel>("\"radar\"").is_err());
    }

    #[test]
    fn test_channel_strategies() {
        assert_eq!(SensorChannel::Lidar.file_extension(), "ply");
        assert_eq!(SensorChannel::DepthCamera.file_extension(), "png");
        assert_eq!(SensorChannel::SemanticLidar.blueprint(), "sensor.lidar.ray_cast_semantic");
    }

    #[test]
    fn test_blank_payload() {
        let blank = SensorPayload::Image(ImageData {
            width: 2,
            height: 1,
            fov: 90.0,
            format: ImageFormat::Bgra8,
            data: Bytes::from(vec![0u8; 8]),
        });
        assert!(blank.is_blank());

        let lit = SensorPayload::Image(ImageData {
            width: 2,
            height: 1,
            fov: 90.0,
            format: ImageFormat::Bgra8,
            data: Bytes::from(vec![0, 0, 0, 0, 0, 9, 0, 0]),
        });
        assert!(!lit.is_blank());
    }
}
