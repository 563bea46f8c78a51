// src/main.rs

mod arbitration;
mod config;
mod error;
mod lanes;
mod occupancy;
mod pipeline;
mod region;
mod render;
mod replay;
mod shutdown;
mod source;
mod types;
#[cfg(feature = "vision")]
mod vision;

use anyhow::{Context, Result};
use pipeline::ControlLoop;
use render::{LogSink, StatusSink};
use std::sync::Arc;
use tracing::{error, info, warn};
use types::{Config, LaneId};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter())
        .init();

    info!("🚦 Traffic Signal Control Starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Signal: {} lanes, dwell {} ms, initial green on Road {}",
        config.lanes.len(),
        config.signal.dwell_ms,
        config.signal.initial_lane
    );

    let lanes = lanes::build_lanes(&config)?;
    let sink = build_sink(&config)?;

    let control = ControlLoop::start(lanes, config.loop_settings(), sink.clone())?;
    let shutdown = control.shutdown_handle();
    let display = render::spawn_signal_display(
        control.subscribe_signal(),
        sink,
        control.lane_count(),
        shutdown.listener(),
    );

    info!("Press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutdown requested, stopping loops...");

    let final_state = control.signal_state();
    let final_readings: Vec<_> = (0..control.lane_count())
        .filter_map(|i| control.subscribe_lane(LaneId(i)))
        .map(|rx| *rx.borrow())
        .collect();
    let metrics = control.metrics();
    let outcomes = control.stop().await;
    if let Err(e) = display.await {
        warn!("Signal display panicked: {}", e);
    }

    info!("\n========================================");
    info!(
        "Final signal: {} green after {} ticks",
        final_state.active_lane, final_state.tick
    );
    for reading in &final_readings {
        info!(
            "  {}: last count {} (frame {:?})",
            reading.lane, reading.count, reading.frame_index
        );
    }
    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => info!("  ✓ {} stopped cleanly", outcome.lane),
            Err(e) => warn!("  ✗ {} failed: {}", outcome.lane, e),
        }
    }

    let summary = metrics.summary();
    info!(
        "  Switches: {} started, {} committed",
        summary.switches_started, summary.switches_committed
    );
    println!("{}", serde_json::to_string(&summary)?);
    info!("========================================");

    Ok(())
}

#[cfg(feature = "vision")]
fn build_sink(config: &Config) -> Result<Arc<dyn StatusSink>> {
    if !config.video.save_annotated {
        return Ok(Arc::new(LogSink));
    }

    let overlay = vision::OverlayWriter::new(&config.video.output_dir, config.lanes.len())?;
    info!("✓ Annotated output enabled: {}", config.video.output_dir);
    Ok(Arc::new(render::MultiSink::new(vec![
        Arc::new(LogSink) as Arc<dyn StatusSink>,
        Arc::new(overlay),
    ])))
}

#[cfg(not(feature = "vision"))]
fn build_sink(config: &Config) -> Result<Arc<dyn StatusSink>> {
    if config.video.save_annotated {
        warn!("video.save_annotated needs the `vision` feature; logging only");
    }
    Ok(Arc::new(LogSink))
}
