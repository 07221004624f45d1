//! Stereoscopic frame packing.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How the two eye views are packed into one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StereoMode {
    /// Single view.
    #[default]
    Mono,
    /// Left eye on top, right eye below.
    TopBottom,
    /// Left eye on the left, right eye on the right.
    LeftRight,
    /// Alternating frames.
    FrameSequential,
    /// Color-filtered overlay.
    Anaglyph,
    /// Stereo hinted but packing unknown.
    Unknown,
}

impl StereoMode {
    /// All stereo modes.
    pub const ALL: &'static [StereoMode] = &[
        StereoMode::Mono,
        StereoMode::TopBottom,
        StereoMode::LeftRight,
        StereoMode::FrameSequential,
        StereoMode::Anaglyph,
        StereoMode::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StereoMode::Mono => "mono",
            StereoMode::TopBottom => "top_bottom",
            StereoMode::LeftRight => "left_right",
            StereoMode::FrameSequential => "frame_sequential",
            StereoMode::Anaglyph => "anaglyph",
            StereoMode::Unknown => "unknown",
        }
    }

    /// Returns true for any two-eye packing.
    pub fn is_stereoscopic(&self) -> bool {
        !matches!(self, StereoMode::Mono)
    }

    /// Returns true when the eyes are split spatially inside one frame.
    pub fn is_spatially_packed(&self) -> bool {
        matches!(self, StereoMode::TopBottom | StereoMode::LeftRight)
    }
}

impl fmt::Display for StereoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StereoMode {
    type Err = StereoModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "mono" | "monoscopic" => Ok(StereoMode::Mono),
            "top_bottom" | "tb" | "over_under" => Ok(StereoMode::TopBottom),
            "left_right" | "lr" | "sbs" | "side_by_side" => Ok(StereoMode::LeftRight),
            "frame_sequential" => Ok(StereoMode::FrameSequential),
            "anaglyph" => Ok(StereoMode::Anaglyph),
            "unknown" => Ok(StereoMode::Unknown),
            _ => Err(StereoModeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown stereo mode: {0}")]
pub struct StereoModeParseError(String);

/// One eye of a stereo pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Eye {
    #[default]
    Left,
    Right,
}

impl Eye {
    pub fn as_str(&self) -> &'static str {
        match self {
            Eye::Left => "left",
            Eye::Right => "right",
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requested treatment of stereo content during a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case", tag = "mode", content = "value")]
pub enum StereoHandling {
    /// Keep the source packing.
    #[default]
    Preserve,
    /// Keep one eye, scaled back to the full frame.
    ExtractEye(Eye),
    /// Re-pack the two eyes.
    Convert(StereoMode),
}
