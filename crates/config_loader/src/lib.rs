//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce the resolved `CosimConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("cosim.toml")).unwrap();
//! println!("Ego: {}", config.perception.ego_id);
//! ```

mod parser;
mod validator;

pub use contracts::CosimConfig;
pub use parser::ConfigFormat;
pub use validator::validate;

use contracts::CosimError;
use std::path::Path;
use tracing::debug;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<CosimConfig, CosimError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        let config = Self::load_from_str(&content, format)?;
        debug!(path = %path.display(), ?format, "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from string
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<CosimConfig, CosimError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Serialize a configuration to a TOML string
    pub fn to_toml(config: &CosimConfig) -> Result<String, CosimError> {
        toml::to_string_pretty(config)
            .map_err(|e| CosimError::configuration("<document>", format!("TOML serialize error: {e}")))
    }

    /// Serialize a configuration to a JSON string
    pub fn to_json(config: &CosimConfig) -> Result<String, CosimError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| CosimError::configuration("<document>", format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, CosimError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            CosimError::configuration(
                path.display().to_string(),
                "cannot determine file format from extension",
            )
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            CosimError::configuration(
                path.display().to_string(),
                format!("unsupported config format: .{ext}"),
            )
        })
    }

    fn read_file(path: &Path) -> Result<String, CosimError> {
        std::fs::read_to_string(path).map_err(|e| {
            CosimError::configuration(
                path.display().to_string(),
                format!("failed to read config: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
step_length = 0.1

[sync]
tls_manager = "vehicle"
sync_vehicle_lights = true

[perception]
ego_id = "0"
comm_range = 40.0
sample_size = 4
"#;

    #[test]
    fn test_load_from_str_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.perception.sample_size, 4);
        assert!(config.sync.sync_vehicle_lights);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config.perception.comm_range, config2.perception.comm_range);
        assert_eq!(config.sensors.riders.len(), config2.sensors.riders.len());
        assert_eq!(config.sync.tls_manager, config2.sync.tls_manager);
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config.perception.ego_id, config2.perception.ego_id);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[perception]
comm_range = -1.0
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("comm_range"), "got: {err}");
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "perception": {{ "sample_size": 2 }} }}"#).unwrap();

        let config = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(config.perception.sample_size, 2);
    }

    #[test]
    fn test_vtypes_path_checked_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let vtypes = dir.path().join("vtypes.json");
        std::fs::write(&vtypes, "{}").unwrap();

        let config_path = dir.path().join("cosim.toml");
        std::fs::write(
            &config_path,
            format!("[sync]\nvtypes_path = {:?}\n", vtypes.display().to_string()),
        )
        .unwrap();
        assert!(ConfigLoader::load_from_path(&config_path).is_ok());

        std::fs::remove_file(&vtypes).unwrap();
        let err = ConfigLoader::load_from_path(&config_path).unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"), "got: {err}");
    }
}
