//! # Observability
//!
//! Tracing and Prometheus metrics for co-simulation runs.
//!
//! - Tracing setup (JSON / pretty / compact)
//! - Prometheus exporter
//! - Per-tick metrics and run statistics
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig::default())?;
//!
//! let sample = TickSample { tick, duration_ms, ..Default::default() };
//! observability::record_tick_metrics(&sample);
//! aggregator.update(&sample);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

// Re-exports
pub use crate::metrics::{
    record_mirror_dropped, record_mirror_spawn_failure, record_tick_metrics, RunningStats,
    StatsSummary, TickSample, TickStatsAggregator, TickSummary,
};

/// Tracing and exporter settings for one process
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
    /// Level used when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON, one object per event
    Json,
    /// Multi-line, human readable
    Pretty,
    /// Single line
    #[default]
    Compact,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    }
}

/// Install the global subscriber, then the exporter when a port is set.
///
/// Fails if a global subscriber or metrics recorder is already installed.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    tracing_subscriber::registry()
        .with(fmt_layer(config.log_format))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        level = %config.default_log_level,
        "Observability initialized"
    );
    Ok(())
}

/// Install only the Prometheus exporter, for when tracing is already set up
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus exporter on port {port}"))?;
    tracing::info!(port, "Prometheus endpoint listening");
    Ok(())
}
