#![deny(unreachable_patterns)]
//! Spherical video geometry and FFmpeg plumbing.
//!
//! This crate provides:
//! - Spherical metadata detection from tags, dimensions and file names
//! - Remap grids for perspective viewports and little-planet views, with a shared cache
//! - Viewport, thumbnail and sprite sheet rendering from decoded frames
//! - Bitrate ladder planning and processing recommendations
//! - The [`EncodingService`] collaborator and its FFmpeg implementation

pub mod analysis;
pub mod command;
pub mod detect;
pub mod error;
pub mod extract;
pub mod filters;
pub mod geometry;
pub mod ladder;
pub mod metrics;
pub mod probe;
pub mod service;
pub mod sprite;

pub use analysis::{analyze, estimate_conversion_seconds, SphericalAnalysis};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use detect::{detect, DetectionSignals};
pub use error::{MediaError, MediaResult};
pub use extract::{
    extract_named_viewports, extract_viewport, remap_frame, select_dominant_regions,
    ThumbnailOptions,
};
pub use filters::{build_grid_filter, build_projection_filter};
pub use geometry::{build_stereographic_map, build_viewport_map, RemapCache, RemapGrid};
pub use ladder::{plan, plan_with, LadderOptions};
pub use probe::{probe_video, VideoInfo};
pub use service::{EncodeRequest, EncodedArtifact, EncodingService, FfmpegEncodingService};
pub use sprite::{compose_sprite_sheet, SpriteSheet, SPRITE_COLUMNS};
