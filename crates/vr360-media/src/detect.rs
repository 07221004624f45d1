//! Spherical video detection.
//!
//! Combines three kinds of evidence into one [`SphericalMetadata`]:
//!
//! - container/stream tags (confidence 1.0)
//! - frame geometry: 2:1 aspect ratio (0.8-0.9) or a known capture size (0.7)
//! - file name hints (0.6, or 0.7 when a projection is named)
//!
//! Final confidence is the strongest signal. Projection comes from the
//! strongest signal that names one; weaker signals never override it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vr360_models::{
    CubemapLayout, DetectionMethod, FieldOfView, InitialView, ProjectionType, SphericalMetadata,
    StereoMode,
};

/// Raw inputs for detection, as read from a probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSignals {
    /// Container and video stream tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub width: u32,
    pub height: u32,
    /// File name or other human-given label.
    #[serde(default)]
    pub source_name: Option<String>,
}

impl DetectionSignals {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }
}

/// One piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Evidence {
    method: DetectionMethod,
    confidence: f64,
    projection: Option<ProjectionType>,
    stereo: Option<StereoMode>,
}

/// Frame sizes of common captures that a plain aspect-ratio check misses.
const KNOWN_LAYOUTS: &[(u32, u32, ProjectionType, StereoMode)] = &[
    // Full-sphere equirectangular, either orientation
    (3840, 1920, ProjectionType::Equirectangular, StereoMode::Mono),
    (1920, 960, ProjectionType::Equirectangular, StereoMode::Mono),
    (2560, 1280, ProjectionType::Equirectangular, StereoMode::Mono),
    (4096, 2048, ProjectionType::Equirectangular, StereoMode::Mono),
    (5760, 2880, ProjectionType::Equirectangular, StereoMode::Mono),
    (7680, 3840, ProjectionType::Equirectangular, StereoMode::Mono),
    // Top-bottom stereo equirectangular (two 2:1 eyes stacked)
    (2880, 2880, ProjectionType::Equirectangular, StereoMode::TopBottom),
    (3840, 3840, ProjectionType::Equirectangular, StereoMode::TopBottom),
    (4096, 4096, ProjectionType::Equirectangular, StereoMode::TopBottom),
    (5760, 5760, ProjectionType::Equirectangular, StereoMode::TopBottom),
    // Cubemaps
    (3072, 2048, ProjectionType::Cubemap { layout: CubemapLayout::ThreeByTwo }, StereoMode::Mono),
    (4608, 3072, ProjectionType::Cubemap { layout: CubemapLayout::ThreeByTwo }, StereoMode::Mono),
    (6144, 1024, ProjectionType::Cubemap { layout: CubemapLayout::SixByOne }, StereoMode::Mono),
    (9216, 1536, ProjectionType::Cubemap { layout: CubemapLayout::SixByOne }, StereoMode::Mono),
    // YouTube-style equi-angular cubemap
    (3840, 2560, ProjectionType::Eac, StereoMode::Mono),
];

/// Detect spherical geometry from probe signals.
pub fn detect(signals: &DetectionSignals) -> SphericalMetadata {
    let evidence: Vec<Evidence> = [
        tag_evidence(&signals.tags),
        geometry_evidence(signals.width, signals.height),
        filename_evidence(signals.source_name.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect();

    if evidence.is_empty() {
        debug!(width = signals.width, height = signals.height, "No spherical evidence");
        return SphericalMetadata::not_spherical(signals.width, signals.height);
    }

    let mut confidence = 0.0;
    let mut projection: Option<(ProjectionType, f64)> = None;
    let mut stereo: Option<(StereoMode, f64)> = None;

    for e in &evidence {
        confidence = f64::max(confidence, e.confidence);
        if let Some(p) = e.projection {
            if projection.map_or(true, |(_, c)| e.confidence > c) {
                projection = Some((p, e.confidence));
            }
        }
        if let Some(s) = e.stereo {
            if stereo.map_or(true, |(_, c)| e.confidence > c) {
                stereo = Some((s, e.confidence));
            }
        }
    }

    let mut projection = projection
        .map(|(p, _)| p)
        .unwrap_or(ProjectionType::Equirectangular);
    if let (ProjectionType::Cubemap { .. }, Some(layout)) = (projection, tag_cubemap_layout(&signals.tags)) {
        projection = ProjectionType::Cubemap { layout };
    }
    let stereo_mode = stereo.map(|(s, _)| s).unwrap_or_default();

    let metadata = SphericalMetadata::new(
        projection,
        stereo_mode,
        signals.width,
        signals.height,
        confidence,
        evidence.iter().map(|e| e.method),
    );

    let fov = tag_fov(&signals.tags).unwrap_or_else(|| metadata.fov());
    let metadata = metadata
        .with_fov(fov)
        .with_initial_view(tag_initial_view(&signals.tags));

    debug!(
        projection = %metadata.projection(),
        stereo = %metadata.stereo_mode(),
        confidence = metadata.confidence(),
        methods = ?metadata.detection_methods(),
        "Spherical detection complete"
    );

    metadata
}

/// Lowercase and drop separators so `Spherical-Video` matches `sphericalvideo`.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn is_false(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off")
}

fn tag_evidence(tags: &BTreeMap<String, String>) -> Option<Evidence> {
    let mut spherical = false;
    let mut projection = None;
    let mut stereo = None;

    for (key, value) in tags {
        let key = normalize_key(key);

        if key.contains("spherical") && !is_false(value) {
            spherical = true;
            projection = projection.or_else(|| projection_from_text(value));
        } else if matches!(key.as_str(), "projectiontype" | "projection") {
            if let Some(p) = projection_from_text(value) {
                spherical = true;
                projection = Some(p);
            }
        } else if key.contains("stereo") {
            stereo = stereo.or_else(|| stereo_from_text(value));
        }
    }

    spherical.then_some(Evidence {
        method: DetectionMethod::Tag,
        confidence: 1.0,
        projection: Some(projection.unwrap_or(ProjectionType::Equirectangular)),
        stereo,
    })
}

/// Projection named in free text, most specific spelling first.
fn projection_from_text(text: &str) -> Option<ProjectionType> {
    let text = text.to_lowercase();
    let rules: &[(&[&str], ProjectionType)] = &[
        (&["half_equirect", "half-equirect", "hequirect", "vr180"], ProjectionType::HalfEquirectangular),
        (&["equirect"], ProjectionType::Equirectangular),
        (&["eac", "equi-angular", "equiangular"], ProjectionType::Eac),
        (&["cubemap", "cube"], ProjectionType::cubemap()),
        (&["dual_fisheye", "dual-fisheye", "dfisheye"], ProjectionType::DualFisheye),
        (&["fisheye"], ProjectionType::Fisheye),
        (&["cylindrical"], ProjectionType::Cylindrical),
        (&["stereographic", "little planet", "little_planet"], ProjectionType::Stereographic),
        (&["mercator"], ProjectionType::Mercator),
    ];

    rules
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| text.contains(n)))
        .map(|(_, projection)| *projection)
}

fn stereo_from_text(text: &str) -> Option<StereoMode> {
    let text = text.trim().to_lowercase().replace('_', "-");
    if text.contains("mono") {
        Some(StereoMode::Mono)
    } else if text.contains("top-bottom") || text.contains("over-under") || text == "tb" {
        Some(StereoMode::TopBottom)
    } else if text.contains("left-right") || text.contains("side-by-side") || text == "lr" || text == "sbs" {
        Some(StereoMode::LeftRight)
    } else if text.contains("frame") {
        Some(StereoMode::FrameSequential)
    } else if text.contains("anaglyph") {
        Some(StereoMode::Anaglyph)
    } else {
        None
    }
}

fn tag_cubemap_layout(tags: &BTreeMap<String, String>) -> Option<CubemapLayout> {
    tags.iter()
        .find(|(k, _)| normalize_key(k) == "cubemaplayout")
        .and_then(|(_, v)| v.parse().ok())
}

fn tag_number(tags: &BTreeMap<String, String>, name: &str) -> Option<f64> {
    let wanted = normalize_key(name);
    tags.iter()
        .find(|(k, _)| normalize_key(k) == wanted)
        .and_then(|(_, v)| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn tag_initial_view(tags: &BTreeMap<String, String>) -> Option<InitialView> {
    let heading = tag_number(tags, "initial_view_heading_degrees");
    let pitch = tag_number(tags, "initial_view_pitch_degrees");
    let roll = tag_number(tags, "initial_view_roll_degrees");

    if heading.is_none() && pitch.is_none() && roll.is_none() {
        return None;
    }
    Some(InitialView {
        heading: heading.unwrap_or(0.0),
        pitch: pitch.unwrap_or(0.0),
        roll: roll.unwrap_or(0.0),
    })
}

fn tag_fov(tags: &BTreeMap<String, String>) -> Option<FieldOfView> {
    let horizontal = tag_number(tags, "fov_horizontal")?;
    let vertical = tag_number(tags, "fov_vertical")?;
    FieldOfView::new(horizontal, vertical)
}

fn geometry_evidence(width: u32, height: u32) -> Option<Evidence> {
    if width == 0 || height == 0 {
        return None;
    }
    let ratio = width as f64 / height as f64;

    if (1.9..=2.1).contains(&ratio) {
        let confidence = if (1.98..=2.02).contains(&ratio) { 0.9 } else { 0.8 };
        return Some(Evidence {
            method: DetectionMethod::AspectRatio,
            confidence,
            projection: Some(ProjectionType::Equirectangular),
            stereo: None,
        });
    }

    KNOWN_LAYOUTS
        .iter()
        .find(|(w, h, _, _)| (*w, *h) == (width, height) || (*h, *w) == (width, height))
        .map(|(_, _, projection, stereo)| Evidence {
            method: DetectionMethod::KnownResolution,
            confidence: 0.7,
            projection: Some(*projection),
            stereo: Some(*stereo),
        })
}

fn filename_evidence(name: Option<&str>) -> Option<Evidence> {
    let name = name?.to_lowercase();
    // Only the final path component carries hints
    let name = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(&name).to_string();
    let tokens: Vec<&str> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has_token = |wanted: &[&str]| tokens.iter().any(|t| wanted.contains(t));

    let generic = ["360", "spherical", "panoram", "immersive", "omnidirectional"]
        .iter()
        .any(|p| name.contains(p))
        || has_token(&["vr", "vr360", "vr180"]);

    let projection = if has_token(&["vr180"]) {
        Some(ProjectionType::HalfEquirectangular)
    } else if name.contains("equirect") || has_token(&["equi", "erp"]) {
        Some(ProjectionType::Equirectangular)
    } else if has_token(&["eac"]) {
        Some(ProjectionType::Eac)
    } else if name.contains("cubemap") || has_token(&["cube", "cubic"]) {
        Some(ProjectionType::cubemap())
    } else if name.contains("fisheye") {
        Some(ProjectionType::Fisheye)
    } else if name.contains("cylindrical") || has_token(&["cylinder"]) {
        Some(ProjectionType::Cylindrical)
    } else {
        None
    };

    let stereo = if has_token(&["tb", "ou", "topbottom"]) {
        Some(StereoMode::TopBottom)
    } else if has_token(&["sbs", "lr", "sidebyside"]) {
        Some(StereoMode::LeftRight)
    } else {
        None
    };

    if !generic && projection.is_none() {
        return None;
    }

    Some(Evidence {
        method: DetectionMethod::Filename,
        confidence: if projection.is_some() { 0.7 } else { 0.6 },
        projection,
        stereo,
    })
}
