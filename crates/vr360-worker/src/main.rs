//! Spherical video conversion worker binary.
//!
//! Usage: `vr360-worker <manifest.json>`
//!
//! The manifest holds `{"jobs": [...], "max_parallel": 2}`. Results are
//! printed to stdout as JSON in job order. Ctrl-C stops dispatching new jobs.

use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use vr360_media::FfmpegEncodingService;
use vr360_models::ConversionJob;
use vr360_worker::{metrics, CancelHandle, ConversionOrchestrator, WorkerConfig};

#[derive(Debug, Deserialize)]
struct BatchManifest {
    jobs: Vec<ConversionJob>,
    #[serde(default)]
    max_parallel: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    let manifest_path = std::env::args()
        .nth(1)
        .context("usage: vr360-worker <manifest.json>")?;

    let config = WorkerConfig::from_env();
    config.validate()?;
    info!("Worker config: {:?}", config);

    if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|s| s.parse::<u16>().ok()) {
        metrics::install_exporter(port)?;
        info!(port, "Prometheus exporter listening");
    }

    let raw = tokio::fs::read_to_string(&manifest_path)
        .await
        .with_context(|| format!("reading manifest {}", manifest_path))?;
    let manifest: BatchManifest =
        serde_json::from_str(&raw).with_context(|| format!("parsing manifest {}", manifest_path))?;
    let max_parallel = manifest.max_parallel.unwrap_or(config.max_parallel);

    let service = Arc::new(FfmpegEncodingService::with_timeout(config.job_timeout));
    let orchestrator = ConversionOrchestrator::new(service, config);

    // Setup signal handler
    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, no further jobs will start");
            on_interrupt.cancel();
        }
    });

    info!(jobs = manifest.jobs.len(), max_parallel, "Starting vr360-worker");
    let results = orchestrator
        .convert_batch_with_cancel(&manifest.jobs, max_parallel, &cancel)
        .await;

    println!("{}", serde_json::to_string_pretty(&results)?);

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        error!(failed, total = results.len(), "Batch finished with failures");
        std::process::exit(1);
    }

    info!(total = results.len(), "Batch finished");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vr360=info".parse::<Directive>()?);

    // stdout carries the results, logs go to stderr
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
