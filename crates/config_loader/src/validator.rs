//! Configuration validation
//!
//! Rules:
//! - step_length > 0
//! - endpoint ports non-zero
//! - comm_range > 0, sample_size >= 1, grace_ticks <= max_active_ticks
//! - rider channels unique, drain timeout > 0
//! - vtype mapping file exists when configured

use std::collections::HashSet;

use contracts::{CosimConfig, CosimError};

/// Validate a parsed configuration
///
/// Returns the first error encountered.
pub fn validate(config: &CosimConfig) -> Result<(), CosimError> {
    validate_timing(config)?;
    validate_endpoints(config)?;
    validate_perception(config)?;
    validate_sensors(config)?;
    validate_sync(config)?;
    Ok(())
}

fn validate_timing(config: &CosimConfig) -> Result<(), CosimError> {
    if !(config.step_length > 0.0) {
        return Err(CosimError::configuration(
            "step_length",
            format!("step_length must be > 0, got {}", config.step_length),
        ));
    }
    Ok(())
}

fn validate_endpoints(config: &CosimConfig) -> Result<(), CosimError> {
    if config.traffic.port == 0 {
        return Err(CosimError::configuration("traffic.port", "port cannot be 0"));
    }
    if config.vehicle.port == 0 {
        return Err(CosimError::configuration("vehicle.port", "port cannot be 0"));
    }
    if !(config.vehicle.timeout_sec > 0.0) {
        return Err(CosimError::configuration(
            "vehicle.timeout_sec",
            format!("timeout must be > 0, got {}", config.vehicle.timeout_sec),
        ));
    }
    Ok(())
}

fn validate_perception(config: &CosimConfig) -> Result<(), CosimError> {
    let perception = &config.perception;

    if perception.ego_id.as_str().is_empty() {
        return Err(CosimError::configuration("perception.ego_id", "ego id cannot be empty"));
    }
    if !(perception.comm_range > 0.0) {
        return Err(CosimError::configuration(
            "perception.comm_range",
            format!("comm_range must be > 0, got {}", perception.comm_range),
        ));
    }
    if perception.sample_size == 0 {
        return Err(CosimError::configuration(
            "perception.sample_size",
            "sample_size must be >= 1 (ego is always a member)",
        ));
    }
    if perception.grace_ticks > perception.max_active_ticks {
        return Err(CosimError::configuration(
            "perception.grace_ticks / perception.max_active_ticks",
            format!(
                "grace_ticks ({}) must be <= max_active_ticks ({})",
                perception.grace_ticks, perception.max_active_ticks
            ),
        ));
    }
    Ok(())
}

fn validate_sensors(config: &CosimConfig) -> Result<(), CosimError> {
    let sensors = &config.sensors;

    if sensors.drain_timeout_ms == 0 {
        return Err(CosimError::configuration(
            "sensors.drain_timeout_ms",
            "drain timeout must be > 0",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, rider) in sensors.riders.iter().enumerate() {
        if !seen.insert(rider.channel) {
            return Err(CosimError::configuration(
                format!("sensors.riders[{idx}].channel"),
                format!("duplicate rider channel '{}'", rider.channel),
            ));
        }
    }
    Ok(())
}

fn validate_sync(config: &CosimConfig) -> Result<(), CosimError> {
    if let Some(path) = &config.sync.vtypes_path {
        if !path.is_file() {
            return Err(CosimError::configuration(
                "sync.vtypes_path",
                format!("vtype mapping file '{}' not found", path.display()),
            ));
        }
    }
    Ok(())
}
