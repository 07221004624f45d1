//! Shared data models for the vr360 spherical video engine.
//!
//! This crate provides Serde-serializable types for:
//! - Projections and stereo packing
//! - Spherical metadata produced by detection
//! - Viewports and named viewing angles
//! - Bitrate ladders and encoding configuration
//! - Conversion jobs, results and filter specs

pub mod bitrate;
pub mod encoding;
pub mod filter_spec;
pub mod job;
pub mod metadata;
pub mod projection;
pub mod quality;
pub mod stereo;
pub mod viewport;

// Re-export common types
pub use bitrate::{BitrateLevel360, TileGrid, VideoCodec};
pub use encoding::EncodingConfig;
pub use filter_spec::{FilterSpec, StereoTransform, Transform};
pub use job::{ConversionJob, ConversionResult, FailureKind, GridShape, JobId, QualityPreset, Resolution};
pub use metadata::{DetectionMethod, FieldOfView, InitialView, SphericalMetadata};
pub use projection::{CubemapLayout, ProjectionParseError, ProjectionType};
pub use quality::ContentQualitySignal;
pub use stereo::{Eye, StereoHandling, StereoMode};
pub use viewport::{
    wrap_degrees, ViewingAngle, ViewportConfig, ViewportError, ViewportMotion, DEFAULT_VIEWPORT_FOV,
    MAX_VIEWPORT_FOV, MIN_VIEWPORT_FOV,
};
