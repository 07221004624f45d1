//! Quality-aware bitrate ladder planning for spherical video.

use tracing::debug;
use vr360_models::{
    BitrateLevel360, ContentQualitySignal, ProjectionType, SphericalMetadata, TileGrid, VideoCodec,
};

/// Extra bitrate at full motion intensity.
pub const MAX_MOTION_BOOST: f64 = 0.3;

/// Rungs at or above this height may be tiled.
pub const TILING_MIN_HEIGHT: u32 = 1920;

/// Smallest bitrate of a clamped fallback rung.
const MIN_FALLBACK_BITRATE_KBPS: u32 = 100;

struct BaseLevel {
    name: &'static str,
    width: u32,
    height: u32,
    bitrate_kbps: u32,
    max_bitrate_kbps: u32,
    codec: VideoCodec,
}

const BASE_LEVELS: &[BaseLevel] = &[
    BaseLevel { name: "360p", width: 1280, height: 640, bitrate_kbps: 800, max_bitrate_kbps: 1200, codec: VideoCodec::H264 },
    BaseLevel { name: "480p", width: 1920, height: 960, bitrate_kbps: 1500, max_bitrate_kbps: 2250, codec: VideoCodec::H264 },
    BaseLevel { name: "720p", width: 2560, height: 1280, bitrate_kbps: 3000, max_bitrate_kbps: 4500, codec: VideoCodec::H264 },
    BaseLevel { name: "1080p", width: 3840, height: 1920, bitrate_kbps: 6000, max_bitrate_kbps: 9000, codec: VideoCodec::Hevc },
    BaseLevel { name: "1440p", width: 5120, height: 2560, bitrate_kbps: 12000, max_bitrate_kbps: 18000, codec: VideoCodec::Hevc },
];

/// Index of the rung used when the source size is unknown.
const DEFAULT_LEVEL: usize = 2;

/// Ladder planning options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderOptions {
    /// Allow tile grids on eligible rungs.
    pub tiled: bool,
}

impl Default for LadderOptions {
    fn default() -> Self {
        Self { tiled: true }
    }
}

/// Bitrate multiplier compensating for projection redundancy.
pub fn projection_multiplier(projection: ProjectionType) -> f64 {
    match projection {
        ProjectionType::Equirectangular => 2.8,
        ProjectionType::Cubemap { .. } => 2.3,
        ProjectionType::Eac => 2.5,
        ProjectionType::Fisheye => 2.2,
        ProjectionType::Stereographic => 2.0,
        ProjectionType::HalfEquirectangular
        | ProjectionType::DualFisheye
        | ProjectionType::Cylindrical
        | ProjectionType::Pannini
        | ProjectionType::Mercator
        | ProjectionType::Flat
        | ProjectionType::Unknown => 2.5,
    }
}

/// Tile grid for a rung, if the projection and height allow tiling.
pub fn tile_grid(projection: ProjectionType, height: u32) -> Option<TileGrid> {
    let tileable = matches!(projection, ProjectionType::Equirectangular | ProjectionType::Eac);
    if !tileable || height < TILING_MIN_HEIGHT {
        return None;
    }
    Some(if height >= 2560 {
        TileGrid { columns: 6, rows: 3 }
    } else {
        TileGrid { columns: 4, rows: 2 }
    })
}

/// Plan a ladder with default options.
pub fn plan(metadata: &SphericalMetadata, quality: &ContentQualitySignal) -> Vec<BitrateLevel360> {
    plan_with(metadata, quality, &LadderOptions::default())
}

/// Plan the bitrate ladder for a source.
///
/// Rungs larger than the source are dropped. The result is never empty: a
/// source smaller than every rung gets a single rung at its own size.
pub fn plan_with(
    metadata: &SphericalMetadata,
    quality: &ContentQualitySignal,
    options: &LadderOptions,
) -> Vec<BitrateLevel360> {
    let projection = metadata.projection();
    let multiplier = projection_multiplier(projection);
    let motion_factor = 1.0 + quality.clamped_motion() * MAX_MOTION_BOOST;

    let build = |name: String, width: u32, height: u32, bitrate: u32, max_bitrate: u32, codec: VideoCodec| {
        BitrateLevel360 {
            name,
            width,
            height,
            bitrate_kbps: (bitrate as f64 * motion_factor) as u32,
            max_bitrate_kbps: (max_bitrate as f64 * motion_factor) as u32,
            projection,
            codec,
            bitrate_multiplier: multiplier,
            tiling: if options.tiled { tile_grid(projection, height) } else { None },
        }
    };

    let (src_w, src_h) = (metadata.width(), metadata.height());

    let mut ladder: Vec<BitrateLevel360> = BASE_LEVELS
        .iter()
        .filter(|level| level.width <= src_w && level.height <= src_h)
        .map(|level| {
            build(
                level.name.to_string(),
                level.width,
                level.height,
                level.bitrate_kbps,
                level.max_bitrate_kbps,
                level.codec,
            )
        })
        .collect();

    if ladder.is_empty() {
        let rung = if src_w == 0 || src_h == 0 {
            let level = &BASE_LEVELS[DEFAULT_LEVEL];
            build(level.name.to_string(), level.width, level.height, level.bitrate_kbps, level.max_bitrate_kbps, level.codec)
        } else {
            let smallest = &BASE_LEVELS[0];
            let width = even(src_w.min(smallest.width));
            let height = even(src_h.min(smallest.height));
            let area = (width as f64 * height as f64) / (smallest.width as f64 * smallest.height as f64);
            let scale = |kbps: u32| ((kbps as f64 * area) as u32).max(MIN_FALLBACK_BITRATE_KBPS);
            build(
                format!("{}p", height),
                width,
                height,
                scale(smallest.bitrate_kbps),
                scale(smallest.max_bitrate_kbps),
                smallest.codec,
            )
        };
        ladder.push(rung);
    }

    debug!(
        projection = %projection,
        levels = ladder.len(),
        motion_factor,
        "Planned bitrate ladder"
    );

    ladder
}

/// Round down to an even size, at least 2.
fn even(value: u32) -> u32 {
    (value & !1).max(2)
}
