//! Configuration parsing
//!
//! TOML is the primary format, JSON is accepted as well.

use contracts::{CosimConfig, CosimError};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<CosimConfig, CosimError> {
    toml::from_str(content)
        .map_err(|e| CosimError::configuration("<document>", format!("TOML parse error: {e}")))
}

pub fn parse_json(content: &str) -> Result<CosimConfig, CosimError> {
    serde_json::from_str(content)
        .map_err(|e| CosimError::configuration("<document>", format!("JSON parse error: {e}")))
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<CosimConfig, CosimError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SensorChannel, SyncDirection, TlsManager};

    #[test]
    fn test_parse_toml_sections() {
        let content = r#"
step_length = 0.05

[traffic]
host = "sumo.local"
port = 9000

[sync]
vehicle_direction = "vehicle_to_traffic"
tls_manager = "traffic"
net_offset = [-100.0, 20.5]

[perception]
ego_id = "veh_7"
sample_size = 3

[sensors]
drain_timeout_ms = 500

[[sensors.riders]]
channel = "lidar"
[sensors.riders.attributes]
channels = "16"
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.step_length, 0.05);
        assert_eq!(config.traffic.host, "sumo.local");
        assert_eq!(config.traffic.port, 9000);
        assert_eq!(config.traffic.client_order, 1);
        assert_eq!(config.vehicle.port, 2000);
        assert_eq!(config.sync.vehicle_direction, SyncDirection::VehicleToTraffic);
        assert_eq!(config.sync.tls_manager, TlsManager::Traffic);
        assert_eq!(config.sync.net_offset, [-100.0, 20.5]);
        assert_eq!(config.perception.ego_id, "veh_7");
        assert_eq!(config.perception.sample_size, 3);
        assert_eq!(config.perception.comm_range, 50.0);
        assert_eq!(config.sensors.riders.len(), 1);
        assert_eq!(config.sensors.riders[0].channel, SensorChannel::Lidar);
        assert_eq!(config.sensors.riders[0].attributes["channels"], "16");
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "perception": { "ego_id": "0", "comm_range": 30.0 },
            "output": { "root_path": "/tmp/run" }
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.perception.comm_range, 30.0);
        assert_eq!(config.output.root_path.to_str(), Some("/tmp/run"));
        assert!(config.output.skip_blank_payloads);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let err = parse_toml("invalid toml [[[").unwrap_err();
        assert!(matches!(err, CosimError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let content = r#"
[[sensors.riders]]
channel = "radar"
"#;
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
