//! # Sky Tracker Application Entry Point
//!
//! Wires the offline sensor gateway and the ASCII renderer into the
//! orchestrator for development use: acquires the configured location,
//! prints the 24-hour sun track and the current sun/moon snapshot, then
//! reports the next sunrise and sunset. Pass `--json` to dump the
//! computed track as JSON instead of prose.

// Test modules
#[cfg(test)]
mod tests;

use std::env;

use log::info;
use sky_tracker_lib::config::Config;
use sky_tracker_lib::orchestrator::{AppState, Orchestrator, OrchestratorOptions};
use sky_tracker_lib::render::AsciiSkyRenderer;
use sky_tracker_lib::sensors::FixedSensorGateway;

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Development mode: dump the computed track as JSON
    let json_mode = env::args().any(|arg| arg == "--json");

    let config = Config::load();

    // Create Tokio runtime for async sensor operations
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, json_mode))
}

async fn run(config: Config, json_mode: bool) -> anyhow::Result<()> {
    let sensors = FixedSensorGateway::new(
        config.observer.latitude,
        config.observer.longitude,
        config.observer.heading_deg,
    )?;
    let renderer = AsciiSkyRenderer::new();
    let options = OrchestratorOptions::from(&config);
    let mut orchestrator = Orchestrator::new(sensors, renderer, options);

    orchestrator.on_status_update(|status| {
        info!("status: {} (confidence {})", status.state, status.confidence);
    });

    orchestrator.initialize().await?;
    if orchestrator.status().state != AppState::Rendering {
        orchestrator.request_location().await?;
    }

    if json_mode {
        if let Some(samples) = &orchestrator.status().samples {
            println!("{}", serde_json::to_string_pretty(samples)?);
        }
    }

    // Upcoming horizon events for the acquired location
    if let Some(event) = orchestrator.jump_to_next_sunrise() {
        println!(
            "next sunrise: {} at azimuth {:.1}°",
            event.time.format("%Y-%m-%d %H:%M UTC"),
            event.azimuth_deg
        );
        orchestrator.return_to_now();
    }
    if let Some(event) = orchestrator.jump_to_next_sunset() {
        println!(
            "next sunset:  {} at azimuth {:.1}°",
            event.time.format("%Y-%m-%d %H:%M UTC"),
            event.azimuth_deg
        );
        orchestrator.return_to_now();
    }

    orchestrator.dispose();
    Ok(())
}
