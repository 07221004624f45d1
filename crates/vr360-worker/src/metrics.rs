//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const CONVERSIONS_TOTAL: &str = "vr360_conversions_total";
    pub const CONVERSION_DURATION_SECONDS: &str = "vr360_conversion_duration_seconds";
    pub const BATCH_CANCELLED_TOTAL: &str = "vr360_batch_cancelled_total";
    pub const THUMBNAILS_TOTAL: &str = "vr360_thumbnails_total";
}

/// Install the Prometheus recorder with a scrape endpoint on `port`.
///
/// Must be called from inside a Tokio runtime.
pub fn install_exporter(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Record a finished conversion. `status` is "success", "failed" or "invalid".
pub fn record_conversion(operation: &str, status: &str, duration_secs: f64) {
    let labels = [
        ("operation", operation.to_string()),
        ("status", status.to_string()),
    ];
    counter!(names::CONVERSIONS_TOTAL, &labels).increment(1);

    let op = [("operation", operation.to_string())];
    histogram!(names::CONVERSION_DURATION_SECONDS, &op).record(duration_secs);
}

/// Record jobs skipped because the batch was cancelled.
pub fn record_batch_cancelled(count: u64) {
    if count > 0 {
        counter!(names::BATCH_CANCELLED_TOTAL).increment(count);
    }
}

pub fn record_thumbnail(angle: &str) {
    let labels = [("angle", angle.to_string())];
    counter!(names::THUMBNAILS_TOTAL, &labels).increment(1);
}
