//! Error types for CLI operations.

use std::path::PathBuf;

use contracts::CosimError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Loading or validating the configuration failed
    #[error("Invalid configuration in {}: {source}", path.display())]
    InvalidConfig {
        path: PathBuf,
        #[source]
        source: CosimError,
    },

    /// The co-simulation stopped on a fatal error
    #[error("Co-simulation failed after {ticks} ticks: {source}")]
    RunFailed {
        ticks: u64,
        #[source]
        source: CosimError,
    },
}

impl CliError {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_config(path: impl Into<PathBuf>, source: CosimError) -> Self {
        Self::InvalidConfig {
            path: path.into(),
            source,
        }
    }

    pub fn run_failed(ticks: u64, source: CosimError) -> Self {
        Self::RunFailed { ticks, source }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
