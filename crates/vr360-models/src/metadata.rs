//! Spherical video metadata.
//!
//! [`SphericalMetadata`] is produced once by detection and never mutated.
//! Operations that change the geometry (a conversion, a stereo extraction)
//! derive a new value with the `with_*` methods.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::projection::ProjectionType;
use crate::stereo::StereoMode;

/// Initial viewing direction stored in the container, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct InitialView {
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Field of view covered by the frame, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldOfView {
    pub horizontal: f64,
    pub vertical: f64,
}

impl FieldOfView {
    /// Returns `None` unless `0 < horizontal <= 360` and `0 < vertical <= 180`.
    pub fn new(horizontal: f64, vertical: f64) -> Option<Self> {
        let valid = horizontal > 0.0 && horizontal <= 360.0 && vertical > 0.0 && vertical <= 180.0;
        valid.then_some(Self {
            horizontal,
            vertical,
        })
    }

    /// Natural field of view of a projection.
    pub fn for_projection(projection: ProjectionType) -> Self {
        let (horizontal, vertical) = projection.default_fov();
        Self {
            horizontal,
            vertical,
        }
    }
}

/// Signal that contributed to a detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Container or stream tag.
    Tag,
    /// Frame aspect ratio close to 2:1.
    AspectRatio,
    /// Frame size matches a known capture layout.
    KnownResolution,
    /// Hints in the file name.
    Filename,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Tag => "tag",
            DetectionMethod::AspectRatio => "aspect_ratio",
            DetectionMethod::KnownResolution => "known_resolution",
            DetectionMethod::Filename => "filename",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable description of a video's spherical geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SphericalMetadata {
    is_spherical: bool,
    projection: ProjectionType,
    stereo_mode: StereoMode,
    width: u32,
    height: u32,
    fov: FieldOfView,
    initial_view: Option<InitialView>,
    confidence: f64,
    detection_methods: Vec<DetectionMethod>,
}

impl SphericalMetadata {
    /// Build a metadata snapshot.
    ///
    /// Confidence is clamped to [0, 1] and duplicate detection methods are
    /// dropped, keeping first occurrence order.
    pub fn new(
        projection: ProjectionType,
        stereo_mode: StereoMode,
        width: u32,
        height: u32,
        confidence: f64,
        detection_methods: impl IntoIterator<Item = DetectionMethod>,
    ) -> Self {
        let mut methods = Vec::new();
        for method in detection_methods {
            if !methods.contains(&method) {
                methods.push(method);
            }
        }

        Self {
            is_spherical: projection.is_spherical(),
            projection,
            stereo_mode,
            width,
            height,
            fov: FieldOfView::for_projection(projection),
            initial_view: None,
            confidence: confidence.clamp(0.0, 1.0),
            detection_methods: methods,
        }
    }

    /// Metadata for a video with no spherical evidence.
    pub fn not_spherical(width: u32, height: u32) -> Self {
        Self {
            is_spherical: false,
            projection: ProjectionType::Unknown,
            stereo_mode: StereoMode::Mono,
            width,
            height,
            fov: FieldOfView::for_projection(ProjectionType::Flat),
            initial_view: None,
            confidence: 0.0,
            detection_methods: Vec::new(),
        }
    }

    pub fn is_spherical(&self) -> bool {
        self.is_spherical
    }

    pub fn projection(&self) -> ProjectionType {
        self.projection
    }

    pub fn stereo_mode(&self) -> StereoMode {
        self.stereo_mode
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width over height; 0 for an empty frame.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    pub fn fov(&self) -> FieldOfView {
        self.fov
    }

    pub fn initial_view(&self) -> Option<InitialView> {
        self.initial_view
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn detection_methods(&self) -> &[DetectionMethod] {
        &self.detection_methods
    }

    pub fn is_stereoscopic(&self) -> bool {
        self.stereo_mode.is_stereoscopic()
    }

    /// Front-hemisphere content (VR180).
    pub fn is_vr180(&self) -> bool {
        self.is_spherical
            && (self.projection == ProjectionType::HalfEquirectangular || self.fov.horizontal <= 180.0)
    }

    /// Dimensions of a single eye view.
    pub fn eye_dimensions(&self) -> (u32, u32) {
        match self.stereo_mode {
            StereoMode::TopBottom => (self.width, self.height / 2),
            StereoMode::LeftRight => (self.width / 2, self.height),
            _ => (self.width, self.height),
        }
    }

    /// Same video re-laid out in another projection.
    pub fn with_projection(&self, projection: ProjectionType) -> Self {
        Self {
            is_spherical: projection.is_spherical(),
            projection,
            fov: FieldOfView::for_projection(projection),
            ..self.clone()
        }
    }

    pub fn with_stereo_mode(&self, stereo_mode: StereoMode) -> Self {
        Self {
            stereo_mode,
            ..self.clone()
        }
    }

    pub fn with_dimensions(&self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..self.clone()
        }
    }

    pub fn with_fov(&self, fov: FieldOfView) -> Self {
        Self { fov, ..self.clone() }
    }

    pub fn with_initial_view(&self, initial_view: Option<InitialView>) -> Self {
        Self {
            initial_view,
            ..self.clone()
        }
    }
}
