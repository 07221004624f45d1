//! Viewport definitions.
//!
//! A viewport is the flat view a virtual camera sees when it looks in a
//! direction (yaw, pitch, roll) with a horizontal field of view.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default viewport field of view in degrees.
pub const DEFAULT_VIEWPORT_FOV: f64 = 90.0;

/// Narrowest accepted viewport field of view in degrees.
pub const MIN_VIEWPORT_FOV: f64 = 10.0;

/// Widest accepted viewport field of view in degrees.
pub const MAX_VIEWPORT_FOV: f64 = 180.0;

/// Validation failures for viewport parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewportError {
    #[error("yaw must be within [-180, 180], got {0}")]
    Yaw(f64),

    #[error("pitch must be within [-90, 90], got {0}")]
    Pitch(f64),

    #[error("roll must be within [-180, 180], got {0}")]
    Roll(f64),

    #[error("fov must be within [10, 180], got {0}")]
    Fov(f64),

    #[error("output size must be positive, got {width}x{height}")]
    OutputSize { width: u32, height: u32 },
}

/// Virtual camera parameters. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ViewportConfig {
    /// Rotation about the vertical axis, positive looks right.
    pub yaw: f64,
    /// Rotation about the horizontal axis, positive looks up.
    pub pitch: f64,
    /// In-plane rotation of the image.
    #[serde(default)]
    pub roll: f64,
    /// Horizontal field of view.
    pub fov: f64,
    pub output_width: u32,
    pub output_height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            fov: DEFAULT_VIEWPORT_FOV,
            output_width: 1920,
            output_height: 1080,
        }
    }
}

impl ViewportConfig {
    /// Viewport looking at (yaw, pitch). Yaw is wrapped into [-180, 180].
    pub fn looking_at(yaw: f64, pitch: f64, fov: f64, output_width: u32, output_height: u32) -> Self {
        Self {
            yaw: wrap_degrees(yaw),
            pitch,
            roll: 0.0,
            fov,
            output_width,
            output_height,
        }
    }

    /// Square viewport for a named viewing angle.
    pub fn for_angle(angle: ViewingAngle, fov: f64, size: u32) -> Self {
        let (yaw, pitch) = angle.direction();
        Self::looking_at(yaw, pitch, fov, size, size)
    }

    pub fn with_roll(mut self, roll: f64) -> Self {
        self.roll = roll;
        self
    }

    /// Check every parameter against its valid range.
    pub fn validate(&self) -> Result<(), ViewportError> {
        if !(-180.0..=180.0).contains(&self.yaw) {
            return Err(ViewportError::Yaw(self.yaw));
        }
        if !(-90.0..=90.0).contains(&self.pitch) {
            return Err(ViewportError::Pitch(self.pitch));
        }
        if !(-180.0..=180.0).contains(&self.roll) {
            return Err(ViewportError::Roll(self.roll));
        }
        // NaN fails this check as well
        if !(MIN_VIEWPORT_FOV..=MAX_VIEWPORT_FOV).contains(&self.fov) {
            return Err(ViewportError::Fov(self.fov));
        }
        if self.output_width == 0 || self.output_height == 0 {
            return Err(ViewportError::OutputSize {
                width: self.output_width,
                height: self.output_height,
            });
        }
        Ok(())
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.output_width as f64 / self.output_height.max(1) as f64
    }
}

/// Linear pan between two viewports over a duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ViewportMotion {
    pub end: ViewportConfig,
    /// Pan duration in seconds.
    pub duration: f64,
}

/// Wrap an angle in degrees into [-180, 180].
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid maps +180 to -180; keep the caller's sign at the seam
    if wrapped == -180.0 && angle > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Named viewing directions used for thumbnails and region analysis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ViewingAngle {
    Front,
    Back,
    Left,
    Right,
    Up,
    Down,
    /// Little-planet overview of the whole sphere.
    Stereographic,
}

impl ViewingAngle {
    /// Every named angle.
    pub const ALL: &'static [ViewingAngle] = &[
        ViewingAngle::Front,
        ViewingAngle::Back,
        ViewingAngle::Left,
        ViewingAngle::Right,
        ViewingAngle::Up,
        ViewingAngle::Down,
        ViewingAngle::Stereographic,
    ];

    /// The six cube directions, in canonical tie-break order.
    pub const DIRECTIONS: &'static [ViewingAngle] = &[
        ViewingAngle::Front,
        ViewingAngle::Back,
        ViewingAngle::Left,
        ViewingAngle::Right,
        ViewingAngle::Up,
        ViewingAngle::Down,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewingAngle::Front => "front",
            ViewingAngle::Back => "back",
            ViewingAngle::Left => "left",
            ViewingAngle::Right => "right",
            ViewingAngle::Up => "up",
            ViewingAngle::Down => "down",
            ViewingAngle::Stereographic => "stereographic",
        }
    }

    /// Nominal (yaw, pitch) in degrees. Stereographic has no single direction
    /// and reports straight down, the little-planet pole.
    pub fn direction(&self) -> (f64, f64) {
        match self {
            ViewingAngle::Front => (0.0, 0.0),
            ViewingAngle::Right => (90.0, 0.0),
            ViewingAngle::Back => (180.0, 0.0),
            ViewingAngle::Left => (270.0, 0.0),
            ViewingAngle::Up => (0.0, 90.0),
            ViewingAngle::Down | ViewingAngle::Stereographic => (0.0, -90.0),
        }
    }

    /// Canonical position used to break ties between equal scores.
    pub fn canonical_rank(&self) -> usize {
        match self {
            ViewingAngle::Front => 0,
            ViewingAngle::Back => 1,
            ViewingAngle::Left => 2,
            ViewingAngle::Right => 3,
            ViewingAngle::Up => 4,
            ViewingAngle::Down => 5,
            ViewingAngle::Stereographic => 6,
        }
    }
}

impl fmt::Display for ViewingAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ViewingAngle {
    type Err = ViewingAngleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "front" => Ok(ViewingAngle::Front),
            "back" => Ok(ViewingAngle::Back),
            "left" => Ok(ViewingAngle::Left),
            "right" => Ok(ViewingAngle::Right),
            "up" | "top" => Ok(ViewingAngle::Up),
            "down" | "bottom" => Ok(ViewingAngle::Down),
            "stereographic" | "little_planet" => Ok(ViewingAngle::Stereographic),
            _ => Err(ViewingAngleParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown viewing angle: {0}")]
pub struct ViewingAngleParseError(String);
