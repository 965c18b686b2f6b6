//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// cosim - lockstep co-simulation of a traffic and a vehicle simulator
#[derive(Parser, Debug)]
#[command(
    name = "cosim",
    author,
    version,
    about = "Traffic / vehicle simulator co-simulation synchronizer",
    long_about = "Drives a traffic micro-simulator and a 3D vehicle simulator in lockstep.\n\n\
                  Mirrors every vehicle into the other engine, keeps traffic lights in \n\
                  agreement, and records sensor data around a perception subset of an ego agent."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "COSIM_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "COSIM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Prometheus metrics port (disabled when absent)
    #[arg(long, global = true, env = "COSIM_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a co-simulation against the in-process demo engines
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the resolved configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when absent
    #[arg(short, long, env = "COSIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the output root directory
    #[arg(short, long, env = "COSIM_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Stop after this many ticks (0 = until ego arrives or a signal)
    #[arg(long, default_value = "0", env = "COSIM_MAX_TICKS")]
    pub max_ticks: u64,

    /// Traffic agents around ego in the demo scenario
    #[arg(long, default_value = "8")]
    pub agents: usize,

    /// Tick on which the demo ego agent leaves the network
    #[arg(long, default_value = "200")]
    pub ego_arrival: u64,

    /// Log measurements instead of writing files
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "cosim.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; defaults are shown when absent
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the sensor rider bundle
    #[arg(long)]
    pub sensors: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::try_parse_from([
            "cosim", "-vv", "--log-format", "json", "run", "--max-ticks", "50", "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.max_ticks, 50);
                assert!(args.dry_run);
                assert!(args.config.is_none());
                assert_eq!(args.agents, 8);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["cosim", "-q", "-v", "info"]).is_err());
    }

    #[test]
    fn test_metrics_port_after_subcommand() {
        let cli = Cli::try_parse_from(["cosim", "validate", "--metrics-port", "9100"]).unwrap();
        assert_eq!(cli.metrics_port, Some(9100));
    }
}
