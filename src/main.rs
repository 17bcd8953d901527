//! framepipe - Main Entry Point
//!
//! Runs the frame pipeline described by a TOML config file and logs each
//! processed frame in sequence order. The same binary serves as the process
//! pool's child when started with `--internal-worker`.
//!
//! Usage: `framepipe [config.toml]` (or set `FRAMEPIPE_CONFIG`)

use anyhow::Context;
use framepipe::{
    config::PipelineConfig,
    pipeline::PipelineBuilder,
    pool::{run_worker_main, INTERNAL_WORKER_FLAG},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging(default_filter: &str) {
    // stdout carries pool IPC in child mode, so logs always go to stderr
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == INTERNAL_WORKER_FLAG) {
        init_logging("warn,framepipe=info");
        // Ctrl+C reaches the whole process group; the parent decides when
        // children exit and tells them over stdin
        if let Err(e) = ctrlc::set_handler(|| {
            tracing::debug!("Interrupt ignored in pool process");
        }) {
            tracing::warn!("Failed to install interrupt handler: {}", e);
        }
        std::process::exit(run_worker_main());
    }

    init_logging("info,framepipe=debug");
    tracing::info!("Starting framepipe");

    let config_path = args.first().map(PathBuf::from);
    let config =
        PipelineConfig::resolve(config_path.as_deref()).context("Failed to load configuration")?;

    let mut pipeline = PipelineBuilder::new(config)
        .build()
        .context("Failed to build pipeline")?;

    let stop = pipeline.stop_handle();
    ctrlc::set_handler(move || {
        tracing::info!("Interrupt received, stopping pipeline");
        stop.stop_all();
    })
    .context("Failed to install Ctrl+C handler")?;

    pipeline.start().context("Failed to start pipeline")?;

    let mut consumer = pipeline.consumer();
    for unit in consumer.by_ref() {
        let frame = &unit.payload;
        let latency_ms = chrono::Utc::now().timestamp_millis() - frame.captured_at_ms;
        tracing::info!(
            sequence = unit.sequence,
            width = frame.width,
            height = frame.height,
            format = %frame.format,
            bytes = frame.data.len(),
            latency_ms,
            "Frame delivered"
        );
    }

    let stats = consumer.stats();
    tracing::info!(
        delivered = stats.delivered,
        out_of_order = stats.out_of_order,
        gaps = stats.gaps,
        "Stream finished"
    );

    tracing::info!("Shutting down...");
    pipeline
        .shutdown(SHUTDOWN_TIMEOUT)
        .context("Pipeline shutdown failed")?;

    Ok(())
}
