//! `run` command implementation.

use anyhow::Result;
use tracing::info;

use crate::cli::RunArgs;
use crate::pipeline::{DemoScenario, Pipeline, PipelineConfig};

use super::load_config;

/// Execute the `run` command
pub async fn run_cosim(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref output) = args.output {
        info!(output = %output.display(), "Overriding output root from CLI");
        config.output.root_path = output.clone();
    }

    let scenario = DemoScenario::new(config.perception.ego_id.as_str(), args.agents, args.ego_arrival);
    info!(
        ego = %config.perception.ego_id,
        agents = scenario.agents,
        direction = ?config.sync.vehicle_direction,
        tls_manager = ?config.sync.tls_manager,
        riders = config.sensors.riders.len(),
        "Configuration loaded"
    );

    let pipeline = Pipeline::new(PipelineConfig {
        config,
        scenario,
        max_ticks: (args.max_ticks > 0).then_some(args.max_ticks),
        dry_run: args.dry_run,
    });

    info!("Starting co-simulation...");
    let (report, stats) = pipeline.run().await?;

    info!(
        ticks = report.ticks,
        stop_reason = report.stop_reason.as_str(),
        payloads = report.payloads_delivered,
        "Co-simulation finished"
    );
    println!("\n{report}");
    println!(
        "Recorder: actor_rows={}, payloads_written={}, blank_skipped={}",
        stats.actor_rows, stats.payloads_written, stats.blank_skipped
    );

    Ok(())
}
