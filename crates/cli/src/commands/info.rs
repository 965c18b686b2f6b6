//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::CosimConfig;
use tracing::info;

use crate::cli::InfoArgs;

use super::load_config;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    if let Some(ref path) = args.config {
        info!(config = %path.display(), "Loading configuration info");
    }
    let config = load_config(args.config.as_deref())?;

    if args.json {
        let json = config_loader::ConfigLoader::to_json(&config)
            .context("Failed to serialize config info")?;
        println!("{json}");
    } else {
        print_config_info(&config, args.sensors);
    }

    Ok(())
}

fn print_config_info(config: &CosimConfig, sensors: bool) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  cosim Configuration                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🔌 Engines");
    println!(
        "   ├─ Traffic: {}:{} (client order {})",
        config.traffic.host, config.traffic.port, config.traffic.client_order
    );
    println!(
        "   ├─ Vehicle: {}:{} (timeout {}s)",
        config.vehicle.host, config.vehicle.port, config.vehicle.timeout_sec
    );
    println!("   └─ Step length: {}s", config.step_length);

    let sync = &config.sync;
    println!("\n⚙️  Sync Settings");
    println!("   ├─ Vehicle direction: {:?}", sync.vehicle_direction);
    println!("   ├─ TLS manager: {:?}", sync.tls_manager);
    println!(
        "   ├─ Lights / color / roles: {} / {} / {}",
        sync.sync_vehicle_lights, sync.sync_vehicle_color, sync.highlight_roles
    );
    println!("   ├─ Net offset: ({}, {})", sync.net_offset[0], sync.net_offset[1]);
    println!("   ├─ Max spawn retries: {}", sync.max_spawn_retries);
    match &sync.vtypes_path {
        Some(path) => println!("   └─ Vtypes: {}", path.display()),
        None => println!("   └─ Vtypes: built-in catalog"),
    }

    let perception = &config.perception;
    println!("\n🎯 Perception");
    println!("   ├─ Ego: {}", perception.ego_id);
    println!("   ├─ Comm range: {} m", perception.comm_range);
    println!("   ├─ Sample size: {}", perception.sample_size);
    println!(
        "   └─ Grace / max active ticks: {} / {}",
        perception.grace_ticks, perception.max_active_ticks
    );

    println!(
        "\n📷 Sensors ({} riders, drain timeout {} ms)",
        config.sensors.riders.len(),
        config.sensors.drain_timeout_ms
    );
    if sensors {
        for (i, rider) in config.sensors.riders.iter().enumerate() {
            let prefix = if i + 1 == config.sensors.riders.len() { "└─" } else { "├─" };
            let attributes: Vec<String> = rider
                .attributes
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            println!(
                "   {} {} ({}) z={} [{}]",
                prefix,
                rider.channel,
                rider.channel.blueprint(),
                rider.transform.location.z,
                attributes.join(", ")
            );
        }
    }

    println!("\n📤 Output");
    println!("   ├─ Root: {}", config.output.root_path.display());
    println!("   └─ Skip blank payloads: {}", config.output.skip_blank_payloads);

    println!();
}
