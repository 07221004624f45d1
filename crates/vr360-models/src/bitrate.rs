//! Adaptive bitrate ladder entries for spherical video.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::projection::ProjectionType;

/// Lower and upper bound for the projection bitrate multiplier.
pub const MIN_BITRATE_MULTIPLIER: f64 = 1.0;
pub const MAX_BITRATE_MULTIPLIER: f64 = 5.0;

/// Video codec of a ladder rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    #[default]
    H264,
    Hevc,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::Hevc => "hevc",
        }
    }

    /// FFmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Hevc => "libx265",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tile grid for viewport-adaptive streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TileGrid {
    pub columns: u32,
    pub rows: u32,
}

impl TileGrid {
    pub fn tile_count(&self) -> u32 {
        self.columns * self.rows
    }
}

/// One rung of a spherical bitrate ladder.
///
/// `bitrate_kbps` and `max_bitrate_kbps` are the flat-video baseline (already
/// adjusted for motion); the projection multiplier is applied on top by
/// [`BitrateLevel360::effective_bitrate_kbps`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BitrateLevel360 {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    pub projection: ProjectionType,
    pub codec: VideoCodec,
    pub bitrate_multiplier: f64,
    /// Present when the rung should be tile-encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiling: Option<TileGrid>,
}

impl BitrateLevel360 {
    /// Multiplier clamped to its valid range.
    pub fn multiplier(&self) -> f64 {
        self.bitrate_multiplier
            .clamp(MIN_BITRATE_MULTIPLIER, MAX_BITRATE_MULTIPLIER)
    }

    /// Target bitrate after the projection multiplier.
    pub fn effective_bitrate_kbps(&self) -> u32 {
        (self.bitrate_kbps as f64 * self.multiplier()).round() as u32
    }

    /// Peak bitrate after the projection multiplier.
    pub fn effective_max_bitrate_kbps(&self) -> u32 {
        (self.max_bitrate_kbps as f64 * self.multiplier()).round() as u32
    }

    pub fn is_tiled(&self) -> bool {
        self.tiling.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(multiplier: f64) -> BitrateLevel360 {
        BitrateLevel360 {
            name: "720p".to_string(),
            width: 2560,
            height: 1280,
            bitrate_kbps: 3000,
            max_bitrate_kbps: 4500,
            projection: ProjectionType::Equirectangular,
            codec: VideoCodec::H264,
            bitrate_multiplier: multiplier,
            tiling: None,
        }
    }

    #[test]
    fn test_effective_bitrate() {
        let rung = level(2.8);
        assert_eq!(rung.effective_bitrate_kbps(), 8400);
        assert_eq!(rung.effective_max_bitrate_kbps(), 12600);
    }

    #[test]
    fn test_multiplier_is_clamped() {
        assert_eq!(level(9.0).multiplier(), MAX_BITRATE_MULTIPLIER);
        assert_eq!(level(0.2).multiplier(), MIN_BITRATE_MULTIPLIER);
        assert_eq!(level(0.2).effective_bitrate_kbps(), 3000);
    }

    #[test]
    fn test_tile_count() {
        assert_eq!(TileGrid { columns: 6, rows: 3 }.tile_count(), 18);
    }
}
