//! Declarative transform descriptions handed to the encoding collaborator.
//!
//! A [`FilterSpec`] says *what* the output should look like; translating it
//! into a concrete filter graph is the collaborator's job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{GridShape, Resolution};
use crate::projection::ProjectionType;
use crate::stereo::{Eye, StereoMode};
use crate::viewport::{ViewportConfig, ViewportMotion};

/// Resolved stereo operation, with the source packing known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum StereoTransform {
    #[default]
    None,
    ExtractEye { packing: StereoMode, eye: Eye },
    Repack { from: StereoMode, to: StereoMode },
}

/// Projection transform of one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FilterSpec {
    pub source_projection: ProjectionType,
    pub target_projection: ProjectionType,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    /// Packing of the input frames.
    #[serde(default)]
    pub source_stereo: StereoMode,
    #[serde(default)]
    pub stereo: StereoTransform,
    /// Camera when the target is `flat`.
    #[serde(default)]
    pub viewport: Option<ViewportConfig>,
    #[serde(default)]
    pub viewport_motion: Option<ViewportMotion>,
}

impl FilterSpec {
    pub fn new(source_projection: ProjectionType, target_projection: ProjectionType) -> Self {
        Self {
            source_projection,
            target_projection,
            resolution: None,
            source_stereo: StereoMode::Mono,
            stereo: StereoTransform::None,
            viewport: None,
            viewport_motion: None,
        }
    }

    pub fn with_resolution(mut self, resolution: Option<Resolution>) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_source_stereo(mut self, source_stereo: StereoMode) -> Self {
        self.source_stereo = source_stereo;
        self
    }

    pub fn with_stereo(mut self, stereo: StereoTransform) -> Self {
        self.stereo = stereo;
        self
    }

    pub fn with_viewport(mut self, viewport: Option<ViewportConfig>, motion: Option<ViewportMotion>) -> Self {
        self.viewport = viewport;
        self.viewport_motion = motion;
        self
    }

    /// True when the output keeps the source projection.
    pub fn is_identity_projection(&self) -> bool {
        self.source_projection == self.target_projection
    }

    /// Stereo packing of the output.
    pub fn output_stereo_mode(&self) -> StereoMode {
        match self.stereo {
            StereoTransform::None => self.source_stereo,
            StereoTransform::ExtractEye { .. } => StereoMode::Mono,
            StereoTransform::Repack { to, .. } => to,
        }
    }
}

/// Operation requested from the encoding collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Transform {
    /// Re-project a single input.
    Projection(FilterSpec),
    /// Tile several inputs into one frame, row-major.
    Grid { shape: GridShape, cell: Resolution },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_stereo_mode() {
        let spec = FilterSpec::new(ProjectionType::Equirectangular, ProjectionType::cubemap())
            .with_source_stereo(StereoMode::TopBottom);
        assert_eq!(spec.output_stereo_mode(), StereoMode::TopBottom);

        let extract = spec.clone().with_stereo(StereoTransform::ExtractEye {
            packing: StereoMode::TopBottom,
            eye: Eye::Left,
        });
        assert_eq!(extract.output_stereo_mode(), StereoMode::Mono);

        let repack = spec.with_stereo(StereoTransform::Repack {
            from: StereoMode::TopBottom,
            to: StereoMode::LeftRight,
        });
        assert_eq!(repack.output_stereo_mode(), StereoMode::LeftRight);
    }

    #[test]
    fn test_identity_projection() {
        let spec = FilterSpec::new(ProjectionType::Eac, ProjectionType::Eac);
        assert!(spec.is_identity_projection());
    }
}
