//! Perspective (viewport) remap grids over an equirectangular source.
//!
//! Camera convention: +z forward, +x right, +y up. A viewport's roll rotates
//! the image plane first, then pitch tilts the camera up or down, then yaw
//! turns it around the vertical axis (heading, pitch, roll applied as
//! intrinsic rotations). Every parameter combination uses this one order.

use vr360_models::{ProjectionType, Resolution, ViewportConfig};

use super::grid::{RemapGrid, Sample};
use super::{ensure_equirectangular, equirect_coords, Vec3};
use crate::error::MediaResult;

/// Pinhole camera derived from a validated viewport.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Camera {
    half_width: f64,
    half_height: f64,
    aspect: f64,
    focal: f64,
    yaw: (f64, f64),
    pitch: (f64, f64),
    roll: (f64, f64),
}

impl Camera {
    pub fn new(viewport: &ViewportConfig) -> Self {
        let sin_cos = |deg: f64| deg.to_radians().sin_cos();
        Self {
            half_width: viewport.output_width as f64 / 2.0,
            half_height: viewport.output_height as f64 / 2.0,
            aspect: viewport.output_height as f64 / viewport.output_width as f64,
            focal: 1.0 / (viewport.fov.to_radians() / 2.0).tan(),
            yaw: sin_cos(viewport.yaw),
            pitch: sin_cos(viewport.pitch),
            roll: sin_cos(viewport.roll),
        }
    }

    /// Unit view ray through output pixel (x, y).
    pub fn ray(&self, x: u32, y: u32) -> Vec3 {
        // Normalized device coordinates, y scaled so pixels stay square
        let nx = (x as f64 - self.half_width) / self.half_width;
        let ny = (y as f64 - self.half_height) / self.half_height * self.aspect;

        let (sr, cr) = self.roll;
        let px = nx * cr - ny * sr;
        let py = nx * sr + ny * cr;

        let ray = Vec3::new(px / self.focal, -py / self.focal, 1.0).normalized();

        let (sp, cp) = self.pitch;
        let pitched = Vec3::new(ray.x, ray.y * cp + ray.z * sp, -ray.y * sp + ray.z * cp);

        let (sy, cy) = self.yaw;
        Vec3::new(
            pitched.x * cy + pitched.z * sy,
            pitched.y,
            -pitched.x * sy + pitched.z * cy,
        )
    }
}

/// Build the remap grid for a viewport over an equirectangular source.
///
/// The viewport is validated before anything is computed. Output size comes
/// from the viewport.
pub fn build_viewport_map(
    source_projection: ProjectionType,
    viewport: &ViewportConfig,
    source: Resolution,
) -> MediaResult<RemapGrid> {
    viewport.validate()?;
    ensure_equirectangular(source_projection)?;

    let camera = Camera::new(viewport);
    let output = Resolution::new(viewport.output_width, viewport.output_height);

    RemapGrid::build(source, output, |x, y| {
        let (u, v) = equirect_coords(camera.ray(x, y), source);
        Sample::at(u, v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use vr360_models::ViewingAngle;

    const SOURCE: Resolution = Resolution {
        width: 3840,
        height: 1920,
    };

    fn viewport(yaw: f64, pitch: f64, fov: f64) -> ViewportConfig {
        ViewportConfig::looking_at(yaw, pitch, fov, 64, 64)
    }

    #[test]
    fn test_front_center_maps_to_frame_center() {
        let grid = build_viewport_map(ProjectionType::Equirectangular, &viewport(0.0, 0.0, 90.0), SOURCE)
            .unwrap();
        let (u, v) = grid.lookup(32, 32).unwrap();
        assert!((u - 1920.0).abs() < 0.01, "u = {}", u);
        assert!((v - 960.0).abs() < 0.01, "v = {}", v);
    }

    #[test]
    fn test_yaw_moves_center_right() {
        let grid = build_viewport_map(ProjectionType::Equirectangular, &viewport(90.0, 0.0, 90.0), SOURCE)
            .unwrap();
        let (u, v) = grid.lookup(32, 32).unwrap();
        assert!((u - 2880.0).abs() < 0.01, "u = {}", u);
        assert!((v - 960.0).abs() < 0.01);
    }

    #[test]
    fn test_pitch_up_samples_top_rows() {
        let grid = build_viewport_map(ProjectionType::Equirectangular, &viewport(0.0, 60.0, 60.0), SOURCE)
            .unwrap();
        let (_, v) = grid.lookup(32, 32).unwrap();
        // latitude 60 sits a sixth of the way down
        assert!((v - 320.0).abs() < 0.01, "v = {}", v);

        // image top is further up than image bottom
        let (_, top) = grid.lookup(32, 0).unwrap();
        let (_, bottom) = grid.lookup(32, 63).unwrap();
        assert!(top < bottom);
    }

    #[test]
    fn test_left_of_image_is_left_of_scene() {
        let grid = build_viewport_map(ProjectionType::Equirectangular, &viewport(0.0, 0.0, 90.0), SOURCE)
            .unwrap();
        let (left, _) = grid.lookup(0, 32).unwrap();
        let (right, _) = grid.lookup(63, 32).unwrap();
        assert!(left < 1920.0 && right > 1920.0);
    }

    #[test]
    fn test_all_coordinates_in_bounds() {
        for angle in ViewingAngle::DIRECTIONS {
            for fov in [10.0, 90.0, 180.0] {
                let vp = ViewportConfig::for_angle(*angle, fov, 48).with_roll(30.0);
                let grid = build_viewport_map(ProjectionType::Equirectangular, &vp, Resolution::new(2, 2))
                    .unwrap();
                assert!(grid.u().iter().all(|u| (0.0..=1.0).contains(u)));
                assert!(grid.v().iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }

    #[test]
    fn test_invalid_viewport_is_rejected() {
        let err = build_viewport_map(ProjectionType::Equirectangular, &viewport(0.0, 0.0, 200.0), SOURCE)
            .unwrap_err();
        assert!(matches!(err, MediaError::Validation(_)));
    }

    #[test]
    fn test_non_equirectangular_source_is_rejected() {
        let err = build_viewport_map(ProjectionType::cubemap(), &viewport(0.0, 0.0, 90.0), SOURCE).unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedProjection(_)));
    }
}
