//! Processing recommendations for a detected spherical video.

use serde::{Deserialize, Serialize};
use vr360_models::{
    wrap_degrees, BitrateLevel360, ContentQualitySignal, ProjectionType, SphericalMetadata,
    ViewingAngle, ViewportConfig,
};

use crate::extract::select_dominant_regions;
use crate::ladder;

/// Pixels processed per second by a typical conversion.
const BASE_PIXEL_RATE: f64 = 2_000_000.0;

/// Fixed overhead on top of the pixel estimate.
const ESTIMATE_OVERHEAD: f64 = 1.2;

/// Frame rate assumed when the source does not report one.
const FALLBACK_FPS: f64 = 30.0;

/// Sources at least this wide benefit from tiled encoding.
const TILED_MIN_WIDTH: u32 = 3840;

/// Motion above this suggests offering a flat cut.
const FLAT_RECOMMEND_MOTION: f64 = 0.6;

/// Motion at or above this rules out viewport-adaptive streaming.
const VIEWPORT_ADAPTIVE_MAX_MOTION: f64 = 0.8;

const RECOMMENDED_FOV: f64 = 90.0;
const RECOMMENDED_WIDTH: u32 = 1920;
const RECOMMENDED_HEIGHT: u32 = 1080;
const MAX_OPTIMAL_PROJECTIONS: usize = 3;

/// Recommendations for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphericalAnalysis {
    pub metadata: SphericalMetadata,
    pub dominant_regions: Vec<ViewingAngle>,
    pub recommended_viewports: Vec<ViewportConfig>,
    pub optimal_projections: Vec<ProjectionType>,
    pub supports_tiled_encoding: bool,
    pub supports_viewport_adaptive: bool,
    /// Share of equirectangular pixels wasted near the poles, 0 to 0.3.
    pub pole_distortion: f64,
    pub ladder: Vec<BitrateLevel360>,
}

/// Analyze detected metadata and motion signals.
pub fn analyze(metadata: &SphericalMetadata, quality: &ContentQualitySignal) -> SphericalAnalysis {
    let projection = metadata.projection();
    let motion = quality.clamped_motion();
    let spherical = metadata.is_spherical();

    SphericalAnalysis {
        metadata: metadata.clone(),
        dominant_regions: select_dominant_regions(&quality.region_motion),
        recommended_viewports: if spherical { recommended_viewports(metadata) } else { Vec::new() },
        optimal_projections: if spherical { optimal_projections(metadata, motion) } else { Vec::new() },
        supports_tiled_encoding: metadata.width() >= TILED_MIN_WIDTH
            && matches!(projection, ProjectionType::Equirectangular | ProjectionType::Eac),
        supports_viewport_adaptive: matches!(
            projection,
            ProjectionType::Equirectangular | ProjectionType::Cubemap { .. }
        ) && motion < VIEWPORT_ADAPTIVE_MAX_MOTION,
        pole_distortion: pole_distortion(metadata),
        ladder: ladder::plan(metadata, quality),
    }
}

/// Pole oversampling estimate; zero for everything but equirectangular.
pub fn pole_distortion(metadata: &SphericalMetadata) -> f64 {
    match metadata.projection() {
        ProjectionType::Equirectangular => (metadata.height() as f64 / 2000.0).min(1.0) * 0.3,
        _ => 0.0,
    }
}

/// The stored initial view (when it is not straight ahead) followed by the
/// six standard directions.
pub fn recommended_viewports(metadata: &SphericalMetadata) -> Vec<ViewportConfig> {
    let mut viewports = Vec::with_capacity(ViewingAngle::DIRECTIONS.len() + 1);

    if let Some(view) = metadata.initial_view() {
        if view.heading != 0.0 || view.pitch != 0.0 {
            viewports.push(
                ViewportConfig::looking_at(
                    view.heading,
                    view.pitch.clamp(-90.0, 90.0),
                    RECOMMENDED_FOV,
                    RECOMMENDED_WIDTH,
                    RECOMMENDED_HEIGHT,
                )
                .with_roll(wrap_degrees(view.roll)),
            );
        }
    }

    viewports.extend(ViewingAngle::DIRECTIONS.iter().map(|angle| {
        let (yaw, pitch) = angle.direction();
        ViewportConfig::looking_at(yaw, pitch, RECOMMENDED_FOV, RECOMMENDED_WIDTH, RECOMMENDED_HEIGHT)
    }));

    viewports
}

/// Projections worth producing from this source, best first.
pub fn optimal_projections(metadata: &SphericalMetadata, motion: f64) -> Vec<ProjectionType> {
    let source = metadata.projection();
    let mut picks = Vec::new();

    match source {
        ProjectionType::Equirectangular if metadata.is_vr180() => {
            picks.push(ProjectionType::HalfEquirectangular);
        }
        ProjectionType::Equirectangular => {
            if metadata.height() >= 1920 {
                picks.extend([ProjectionType::Eac, ProjectionType::cubemap()]);
            }
            picks.push(ProjectionType::Stereographic);
        }
        ProjectionType::Cubemap { .. } => {
            picks.extend([ProjectionType::Eac, ProjectionType::Equirectangular]);
        }
        ProjectionType::Eac => {
            picks.extend([ProjectionType::Equirectangular, ProjectionType::cubemap()]);
        }
        ProjectionType::Fisheye | ProjectionType::DualFisheye if metadata.is_vr180() => {
            picks.push(ProjectionType::HalfEquirectangular);
        }
        ProjectionType::HalfEquirectangular
        | ProjectionType::Fisheye
        | ProjectionType::DualFisheye
        | ProjectionType::Cylindrical
        | ProjectionType::Stereographic
        | ProjectionType::Pannini
        | ProjectionType::Mercator => {
            picks.extend([ProjectionType::Equirectangular, ProjectionType::cubemap()]);
        }
        ProjectionType::Flat | ProjectionType::Unknown => {}
    }

    if motion > FLAT_RECOMMEND_MOTION {
        picks.push(ProjectionType::Flat);
    }

    let mut unique: Vec<ProjectionType> = Vec::new();
    for projection in picks {
        if projection != source && !unique.contains(&projection) {
            unique.push(projection);
        }
    }
    unique.truncate(MAX_OPTIMAL_PROJECTIONS);
    unique
}

/// Rough wall-clock estimate of a projection conversion, at least one second.
pub fn estimate_conversion_seconds(
    width: u32,
    height: u32,
    duration: f64,
    fps: f64,
    source: ProjectionType,
    target: ProjectionType,
) -> f64 {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { FALLBACK_FPS };
    let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
    let pixels = width as f64 * height as f64 * duration * fps;

    let complexity = match (source, target) {
        (ProjectionType::Equirectangular, ProjectionType::Cubemap { .. }) => 1.2,
        (ProjectionType::Equirectangular, ProjectionType::Stereographic) => 1.5,
        (ProjectionType::Cubemap { .. }, ProjectionType::Equirectangular) => 1.1,
        (ProjectionType::Fisheye, ProjectionType::Equirectangular) => 1.8,
        _ => 1.0,
    };

    (pixels / BASE_PIXEL_RATE * complexity * ESTIMATE_OVERHEAD).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vr360_models::{DetectionMethod, InitialView, StereoMode};

    fn equirect(width: u32, height: u32) -> SphericalMetadata {
        SphericalMetadata::new(
            ProjectionType::Equirectangular,
            StereoMode::Mono,
            width,
            height,
            0.9,
            [DetectionMethod::AspectRatio],
        )
    }

    #[test]
    fn test_analyze_4k_equirect() {
        let quality = ContentQualitySignal::new(0.2)
            .with_region(ViewingAngle::Back, 0.7)
            .with_region(ViewingAngle::Front, 0.1);
        let analysis = analyze(&equirect(3840, 1920), &quality);

        assert_eq!(analysis.dominant_regions, vec![ViewingAngle::Front, ViewingAngle::Back]);
        assert_eq!(
            analysis.optimal_projections,
            vec![ProjectionType::Eac, ProjectionType::cubemap(), ProjectionType::Stereographic]
        );
        assert!(analysis.supports_tiled_encoding);
        assert!(analysis.supports_viewport_adaptive);
        assert!((analysis.pole_distortion - 0.288).abs() < 1e-9);
        assert_eq!(analysis.recommended_viewports.len(), 6);
        assert!(!analysis.ladder.is_empty());
    }

    #[test]
    fn test_high_motion_recommends_flat_and_disables_adaptive() {
        let analysis = analyze(&equirect(2048, 1024), &ContentQualitySignal::new(0.9));
        assert_eq!(
            analysis.optimal_projections,
            vec![ProjectionType::Stereographic, ProjectionType::Flat]
        );
        assert!(!analysis.supports_viewport_adaptive);
        assert!(!analysis.supports_tiled_encoding);
    }

    #[test]
    fn test_initial_view_comes_first() {
        let meta = equirect(3840, 1920).with_initial_view(Some(InitialView {
            heading: 270.0,
            pitch: 10.0,
            roll: 0.0,
        }));
        let viewports = recommended_viewports(&meta);
        assert_eq!(viewports.len(), 7);
        assert_eq!(viewports[0].yaw, -90.0);
        assert_eq!(viewports[0].pitch, 10.0);
        assert!(viewports.iter().all(|vp| vp.validate().is_ok()));
    }

    #[test]
    fn test_ordinary_video_gets_no_recommendations() {
        let analysis = analyze(&SphericalMetadata::not_spherical(1920, 1080), &ContentQualitySignal::default());
        assert!(analysis.recommended_viewports.is_empty());
        assert!(analysis.optimal_projections.is_empty());
        assert_eq!(analysis.pole_distortion, 0.0);
        assert_eq!(analysis.dominant_regions, vec![ViewingAngle::Front]);
    }

    #[test]
    fn test_estimate_conversion_seconds() {
        // 3840x1920 for 10 s at 30 fps, 1.2 complexity, 1.2 overhead
        let secs = estimate_conversion_seconds(
            3840,
            1920,
            10.0,
            30.0,
            ProjectionType::Equirectangular,
            ProjectionType::cubemap(),
        );
        assert!((secs - 1592.5248).abs() < 1e-6);

        let tiny = estimate_conversion_seconds(16, 8, 0.1, 0.0, ProjectionType::Eac, ProjectionType::Flat);
        assert_eq!(tiny, 1.0);
    }
}
