//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{CosimConfig, TlsManager};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

use super::load_config;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    ego_id: String,
    step_length: f64,
    vehicle_direction: String,
    tls_manager: String,
    rider_count: usize,
    sample_size: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_config(Some(&args.config)) {
        Ok(config) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&config),
            summary: Some(ConfigSummary {
                ego_id: config.perception.ego_id.to_string(),
                step_length: config.step_length,
                vehicle_direction: format!("{:?}", config.sync.vehicle_direction),
                tls_manager: format!("{:?}", config.sync.tls_manager),
                rider_count: config.sensors.riders.len(),
                sample_size: config.perception.sample_size,
            }),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

/// Non-fatal issues
fn collect_warnings(config: &CosimConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sensors.riders.is_empty() {
        warnings.push("No sensor riders configured - no measurements will be recorded".to_string());
    }
    if config.perception.sample_size == 1 {
        warnings.push("perception.sample_size is 1 - only ego carries sensors".to_string());
    }
    if config.sync.tls_manager == TlsManager::None {
        warnings.push("sync.tls_manager is none - traffic lights are not mirrored".to_string());
    }
    if config.sync.vtypes_path.is_none() {
        warnings.push("sync.vtypes_path not set - using the built-in blueprint catalog".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Ego: {}", summary.ego_id);
            println!("  Step length: {}s", summary.step_length);
            println!("  Vehicle direction: {}", summary.vehicle_direction);
            println!("  TLS manager: {}", summary.tls_manager);
            println!("  Riders: {}", summary.rider_count);
            println!("  Sample size: {}", summary.sample_size);
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {warning}");
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_warnings() {
        let warnings = collect_warnings(&CosimConfig::default());
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("tls_manager")));
    }

    #[test]
    fn test_invalid_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cosim.toml");
        std::fs::write(&path, "[perception]\nsample_size = 0\n").unwrap();

        let result = validate_config(&ValidateArgs {
            config: path,
            json: true,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("sample_size"));
    }
}
