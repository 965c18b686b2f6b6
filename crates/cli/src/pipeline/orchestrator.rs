//! Pipeline orchestrator - wires engines, sink and loop together.

use actor_bridge::{MockTrafficSim, MockVehicleSim};
use contracts::CosimConfig;
use recorder::{FileSink, LogSink, OutputSink, RecorderStats};
use synchronizer::{RunReport, Session, StopHandle, SynchronizationLoop};
use tracing::{info, warn};

use super::DemoScenario;
use crate::error::{CliError, Result};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub config: CosimConfig,
    pub scenario: DemoScenario,
    /// Stop after this many ticks (None = unlimited)
    pub max_ticks: Option<u64>,
    /// Log measurements instead of writing them
    pub dry_run: bool,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run to completion, or until Ctrl-C / SIGTERM
    pub async fn run(self) -> Result<(RunReport, RecorderStats)> {
        let PipelineConfig {
            config,
            scenario,
            max_ticks,
            dry_run,
        } = self.config;

        let traffic = MockTrafficSim::new(scenario.traffic_config());
        let vehicle = MockVehicleSim::new(scenario.vehicle_config());

        let sink = if dry_run {
            OutputSink::Log(LogSink::new("log"))
        } else {
            let sink = FileSink::new("file", &config.output)
                .map_err(|e| CliError::run_failed(0, e))?;
            info!(root = %sink.root().display(), "Writing run output");
            OutputSink::File(sink)
        };

        let mut sync =
            SynchronizationLoop::new(config, Session::new(traffic, vehicle), sink);
        if let Some(ticks) = max_ticks {
            sync = sync.with_tick_limit(ticks);
        }

        let stop = StopHandle::new();
        let signal_task = {
            let stop = stop.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                warn!("Received shutdown signal, draining...");
                stop.stop();
            })
        };

        let result = sync.run(stop).await;
        signal_task.abort();

        let report = result.map_err(|e| CliError::run_failed(sync.tick_count(), e))?;
        Ok((report, sync.sink().stats()))
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synchronizer::StopReason;

    fn quiet_config() -> CosimConfig {
        let mut config = CosimConfig::default();
        config.sensors.drain_timeout_ms = 2000;
        for rider in &mut config.sensors.riders {
            rider
                .attributes
                .extend([("image_size_x".to_string(), "8".to_string()), ("image_size_y".to_string(), "6".to_string())]);
        }
        config
    }

    #[tokio::test]
    async fn test_dry_run_until_tick_limit() {
        let pipeline = Pipeline::new(PipelineConfig {
            config: quiet_config(),
            scenario: DemoScenario::new("0", 4, 100),
            max_ticks: Some(10),
            dry_run: true,
        });
        let (report, stats) = pipeline.run().await.unwrap();
        assert_eq!(report.stop_reason, StopReason::TickLimit);
        assert_eq!(report.ticks, 10);
        assert!(report.mirrors.spawned >= 5);
        assert!(stats.actor_rows > 0);
    }

    #[tokio::test]
    async fn test_dry_run_until_ego_arrives() {
        let mut config = quiet_config();
        config.perception.grace_ticks = 3;
        config.perception.max_active_ticks = 20;
        let pipeline = Pipeline::new(PipelineConfig {
            config,
            scenario: DemoScenario::new("0", 2, 12),
            max_ticks: None,
            dry_run: true,
        });
        let (report, _) = pipeline.run().await.unwrap();
        assert_eq!(report.stop_reason, StopReason::EgoArrived);
        // ego leaves on tick 12, the idle grace then ends the run
        assert!(report.ticks > 12 && report.ticks <= 22);
    }
}
