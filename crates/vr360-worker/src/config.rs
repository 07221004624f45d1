//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vr360_media::ThumbnailOptions;
use vr360_models::{QualityPreset, MAX_VIEWPORT_FOV, MIN_VIEWPORT_FOV};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum conversions running at once in a batch
    pub max_parallel: usize,
    /// Per-encode timeout
    pub job_timeout: Duration,
    /// Scratch directory for intermediate renditions
    pub work_dir: PathBuf,
    /// Edge length of square thumbnails
    pub thumbnail_size: u32,
    /// Horizontal field of view of directional thumbnails, in degrees
    pub thumbnail_fov: f64,
    /// Preset for conversions the worker schedules itself
    pub quality_preset: QualityPreset,
    /// Remap grids kept in memory
    pub remap_cache_capacity: usize,
    /// Seconds between sprite sheet tiles
    pub sprite_interval_secs: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 2,
            job_timeout: Duration::from_secs(3600), // 1 hour
            work_dir: PathBuf::from("/tmp/vr360"),
            thumbnail_size: 512,
            thumbnail_fov: 90.0,
            quality_preset: QualityPreset::Balanced,
            remap_cache_capacity: 32,
            sprite_interval_secs: 10.0,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup. Unset or unparsable values keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<f64>().ok());

        Self {
            max_parallel: lookup("VR360_MAX_PARALLEL")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_parallel),
            job_timeout: Duration::from_secs(
                lookup("VR360_JOB_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.job_timeout.as_secs()),
            ),
            work_dir: lookup("VR360_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            thumbnail_size: lookup("VR360_THUMBNAIL_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.thumbnail_size),
            thumbnail_fov: parse("VR360_THUMBNAIL_FOV").unwrap_or(defaults.thumbnail_fov),
            quality_preset: lookup("VR360_QUALITY_PRESET")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.quality_preset),
            remap_cache_capacity: lookup("VR360_REMAP_CACHE_CAPACITY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.remap_cache_capacity),
            sprite_interval_secs: parse("VR360_SPRITE_INTERVAL_SECS").unwrap_or(defaults.sprite_interval_secs),
        }
    }

    /// Reject settings no job could run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_parallel == 0 {
            return Err(WorkerError::config_error("VR360_MAX_PARALLEL must be at least 1"));
        }
        if self.job_timeout.is_zero() {
            return Err(WorkerError::config_error("VR360_JOB_TIMEOUT_SECS must be positive"));
        }
        if self.thumbnail_size == 0 {
            return Err(WorkerError::config_error("VR360_THUMBNAIL_SIZE must be positive"));
        }
        if !(MIN_VIEWPORT_FOV..=MAX_VIEWPORT_FOV).contains(&self.thumbnail_fov) {
            return Err(WorkerError::config_error(format!(
                "VR360_THUMBNAIL_FOV must be within [10, 180], got {}",
                self.thumbnail_fov
            )));
        }
        if !(self.sprite_interval_secs.is_finite() && self.sprite_interval_secs > 0.0) {
            return Err(WorkerError::config_error("VR360_SPRITE_INTERVAL_SECS must be positive"));
        }
        Ok(())
    }

    pub fn thumbnail_options(&self) -> ThumbnailOptions {
        ThumbnailOptions {
            size: self.thumbnail_size,
            fov: self.thumbnail_fov,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(|_| None);
        assert_eq!(config.max_parallel, 2);
        assert_eq!(config.job_timeout, Duration::from_secs(3600));
        assert_eq!(config.work_dir, PathBuf::from("/tmp/vr360"));
        assert_eq!(config.thumbnail_options(), ThumbnailOptions { size: 512, fov: 90.0 });
        assert_eq!(config.quality_preset, QualityPreset::Balanced);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("VR360_MAX_PARALLEL", "6"),
            ("VR360_JOB_TIMEOUT_SECS", "120"),
            ("VR360_WORK_DIR", "/scratch"),
            ("VR360_THUMBNAIL_FOV", "75.5"),
            ("VR360_QUALITY_PRESET", "archive"),
            ("VR360_THUMBNAIL_SIZE", "not-a-number"),
        ]));
        assert_eq!(config.max_parallel, 6);
        assert_eq!(config.job_timeout, Duration::from_secs(120));
        assert_eq!(config.work_dir, PathBuf::from("/scratch"));
        assert_eq!(config.thumbnail_fov, 75.5);
        assert_eq!(config.quality_preset, QualityPreset::Archive);
        assert_eq!(config.thumbnail_size, 512);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = WorkerConfig { max_parallel: 0, ..Default::default() };
        assert!(matches!(zero.validate(), Err(WorkerError::ConfigError(_))));

        let narrow = WorkerConfig { thumbnail_fov: 5.0, ..Default::default() };
        assert!(narrow.validate().is_err());

        let tiny = WorkerConfig { thumbnail_size: 0, ..Default::default() };
        assert!(tiny.validate().is_err());
    }
}
