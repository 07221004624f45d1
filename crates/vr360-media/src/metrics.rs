//! Media metrics.
//!
//! - Remap cache hit/miss counters
//! - FFmpeg invocation counters by status

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Remap grid cache hits.
    pub const REMAP_CACHE_HITS: &str = "vr360_remap_cache_hits_total";

    /// Remap grid cache misses (grid computed).
    pub const REMAP_CACHE_MISSES: &str = "vr360_remap_cache_misses_total";

    /// FFmpeg runs by status.
    pub const FFMPEG_RUNS: &str = "vr360_ffmpeg_runs_total";
}

pub fn record_cache_hit() {
    counter!(names::REMAP_CACHE_HITS).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::REMAP_CACHE_MISSES).increment(1);
}

/// Record one FFmpeg invocation outcome ("success", "failed", "timeout").
pub fn record_ffmpeg_run(status: &str) {
    counter!(names::FFMPEG_RUNS, "status" => status.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::REMAP_CACHE_HITS.starts_with("vr360_"));
        assert!(names::REMAP_CACHE_MISSES.contains("misses"));
        assert!(names::FFMPEG_RUNS.ends_with("_total"));
    }
}
