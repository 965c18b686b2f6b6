//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_cosim;
pub use validate::run_validate;

use std::path::Path;

use contracts::CosimConfig;
use tracing::info;

use crate::error::{CliError, Result};

/// Load and validate `path`, or fall back to the defaults
fn load_config(path: Option<&Path>) -> Result<CosimConfig> {
    let Some(path) = path else {
        info!("No configuration file given, using defaults");
        return Ok(CosimConfig::default());
    };
    if !path.exists() {
        return Err(CliError::config_not_found(path));
    }
    config_loader::ConfigLoader::load_from_path(path).map_err(|e| CliError::invalid_config(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config.perception.ego_id, "0");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/cosim.toml"))).unwrap_err();
        assert!(matches!(err, CliError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_config_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cosim.toml");
        std::fs::write(&path, "step_length = -1.0\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, CliError::InvalidConfig { .. }));
        assert!(err.to_string().contains("step_length"));
    }
}
