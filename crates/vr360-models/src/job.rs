//! Conversion job definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::metadata::SphericalMetadata;
use crate::projection::ProjectionType;
use crate::stereo::StereoHandling;
use crate::viewport::{ViewportConfig, ViewportMotion};

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoder speed/quality trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Fast,
    #[default]
    Balanced,
    Quality,
    Archive,
}

impl QualityPreset {
    pub const ALL: &'static [QualityPreset] = &[
        QualityPreset::Fast,
        QualityPreset::Balanced,
        QualityPreset::Quality,
        QualityPreset::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Fast => "fast",
            QualityPreset::Balanced => "balanced",
            QualityPreset::Quality => "quality",
            QualityPreset::Archive => "archive",
        }
    }

    /// x264/x265 speed preset.
    pub fn encoder_preset(&self) -> &'static str {
        match self {
            QualityPreset::Fast => "fast",
            QualityPreset::Balanced => "medium",
            QualityPreset::Quality => "slow",
            QualityPreset::Archive => "veryslow",
        }
    }

    /// Constant rate factor.
    pub fn crf(&self) -> u8 {
        match self {
            QualityPreset::Fast => 26,
            QualityPreset::Balanced => 23,
            QualityPreset::Quality => 20,
            QualityPreset::Archive => 18,
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QualityPreset {
    type Err = QualityPresetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(QualityPreset::Fast),
            "balanced" | "medium" => Ok(QualityPreset::Balanced),
            "quality" | "high" => Ok(QualityPreset::Quality),
            "archive" => Ok(QualityPreset::Archive),
            _ => Err(QualityPresetParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown quality preset: {0}")]
pub struct QualityPresetParseError(String);

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Grid shape of a composite preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct GridShape {
    pub columns: u32,
    pub rows: u32,
}

impl GridShape {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    pub fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }
}

impl Default for GridShape {
    fn default() -> Self {
        Self { columns: 2, rows: 2 }
    }
}

/// A single projection conversion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConversionJob {
    #[serde(default)]
    pub id: JobId,
    pub source: PathBuf,
    pub output: PathBuf,
    /// Detected from the source when absent.
    #[serde(default)]
    pub source_projection: Option<ProjectionType>,
    pub target_projection: ProjectionType,
    #[serde(default)]
    pub target_resolution: Option<Resolution>,
    #[serde(default)]
    pub quality_preset: QualityPreset,
    #[serde(default)]
    pub stereo_handling: StereoHandling,
    /// Camera for `flat` targets.
    #[serde(default)]
    pub viewport: Option<ViewportConfig>,
    /// Optional pan for `flat` targets.
    #[serde(default)]
    pub viewport_motion: Option<ViewportMotion>,
}

impl ConversionJob {
    pub fn new(
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        target_projection: ProjectionType,
    ) -> Self {
        Self {
            id: JobId::new(),
            source: source.into(),
            output: output.into(),
            source_projection: None,
            target_projection,
            target_resolution: None,
            quality_preset: QualityPreset::default(),
            stereo_handling: StereoHandling::default(),
            viewport: None,
            viewport_motion: None,
        }
    }

    pub fn with_source_projection(mut self, projection: ProjectionType) -> Self {
        self.source_projection = Some(projection);
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.target_resolution = Some(Resolution::new(width, height));
        self
    }

    pub fn with_quality(mut self, preset: QualityPreset) -> Self {
        self.quality_preset = preset;
        self
    }

    pub fn with_stereo_handling(mut self, handling: StereoHandling) -> Self {
        self.stereo_handling = handling;
        self
    }

    pub fn with_viewport(mut self, viewport: ViewportConfig) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_viewport_motion(mut self, motion: ViewportMotion) -> Self {
        self.viewport_motion = Some(motion);
        self
    }
}

/// Why a conversion produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request was rejected before any collaborator call.
    Invalid,
    /// The collaborator failed or timed out.
    Conversion,
    /// The batch was cancelled before the job was dispatched.
    Cancelled,
}

/// Outcome of one conversion. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConversionResult {
    pub job_id: JobId,
    pub source: PathBuf,
    pub target_projection: ProjectionType,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub elapsed_secs: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Geometry of the produced file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_metadata: Option<SphericalMetadata>,
}

impl ConversionResult {
    pub fn succeeded(
        job: &ConversionJob,
        output: PathBuf,
        elapsed_secs: f64,
        warnings: Vec<String>,
        output_metadata: Option<SphericalMetadata>,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            source: job.source.clone(),
            target_projection: job.target_projection,
            success: true,
            output: Some(output),
            elapsed_secs,
            warnings,
            error: None,
            failure_kind: None,
            output_metadata,
        }
    }

    pub fn failed(
        job: &ConversionJob,
        error: impl Into<String>,
        elapsed_secs: f64,
        warnings: Vec<String>,
    ) -> Self {
        Self::failed_with(job, FailureKind::Conversion, error, elapsed_secs, warnings)
    }

    /// Result for a request rejected before any work started.
    pub fn rejected(job: &ConversionJob, error: impl Into<String>) -> Self {
        Self::failed_with(job, FailureKind::Invalid, error, 0.0, Vec::new())
    }

    /// Result for a job skipped by a cancelled batch.
    pub fn cancelled(job: &ConversionJob, error: impl Into<String>) -> Self {
        Self::failed_with(job, FailureKind::Cancelled, error, 0.0, Vec::new())
    }

    fn failed_with(
        job: &ConversionJob,
        kind: FailureKind,
        error: impl Into<String>,
        elapsed_secs: f64,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            source: job.source.clone(),
            target_projection: job.target_projection,
            success: false,
            output: None,
            elapsed_secs,
            warnings,
            error: Some(error.into()),
            failure_kind: Some(kind),
            output_metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id() {
        let id = JobId::new();
        assert!(!id.as_str().is_empty());
        assert_ne!(id, JobId::new());
        assert_eq!(JobId::from_string("abc").to_string(), "abc");
    }

    #[test]
    fn test_quality_preset_settings() {
        assert_eq!(QualityPreset::Fast.crf(), 26);
        assert_eq!(QualityPreset::Balanced.encoder_preset(), "medium");
        assert_eq!(QualityPreset::Archive.encoder_preset(), "veryslow");
        assert!(QualityPreset::Quality.crf() < QualityPreset::Balanced.crf());
        assert_eq!("high".parse::<QualityPreset>().unwrap(), QualityPreset::Quality);
    }

    #[test]
    fn test_job_deserializes_with_defaults() {
        let json = r#"{
            "source": "in.mp4",
            "output": "out.mp4",
            "target_projection": "cubemap_6x1"
        }"#;
        let job: ConversionJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.source_projection, None);
        assert_eq!(job.quality_preset, QualityPreset::Balanced);
        assert_eq!(job.stereo_handling, StereoHandling::Preserve);
        assert_eq!(job.target_projection.to_string(), "cubemap_6x1");
        assert!(!job.id.as_str().is_empty());
    }

    #[test]
    fn test_failed_result_carries_error() {
        let job = ConversionJob::new("a.mp4", "b.mp4", ProjectionType::Eac);
        let result = ConversionResult::failed(&job, "boom", 0.5, vec![]);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.job_id, job.id);
        assert!(result.output.is_none());
        assert_eq!(result.failure_kind, Some(FailureKind::Conversion));
    }

    #[test]
    fn test_failure_kinds_serialize() {
        let job = ConversionJob::new("a.mp4", "b.mp4", ProjectionType::Eac);
        let rejected = serde_json::to_value(ConversionResult::rejected(&job, "bad fov")).unwrap();
        assert_eq!(rejected["failure_kind"], "invalid");
        let cancelled = ConversionResult::cancelled(&job, "stopped");
        assert_eq!(cancelled.failure_kind, Some(FailureKind::Cancelled));
        assert!(!cancelled.success);

        let ok = ConversionResult::succeeded(&job, "b.mp4".into(), 1.0, vec![], None);
        assert!(serde_json::to_value(ok).unwrap().get("failure_kind").is_none());
    }

    #[test]
    fn test_grid_shape() {
        assert_eq!(GridShape::new(3, 2).cell_count(), 6);
    }
}
