//! Coordinate transform engine.
//!
//! Pure functions that turn projection parameters into [`RemapGrid`]s.
//! Grids are computed on the CPU with rayon and shared through the
//! [`RemapCache`].

mod cache;
mod grid;
mod perspective;
mod stereographic;

pub use cache::{GridKey, RemapCache, DEFAULT_CACHE_CAPACITY};
pub(crate) use grid::Sample;
pub use grid::RemapGrid;
pub use perspective::build_viewport_map;
pub use stereographic::build_stereographic_map;

use std::f64::consts::{FRAC_PI_2, PI};
use vr360_models::{ProjectionType, Resolution};

use crate::error::{MediaError, MediaResult};

/// Direction on the unit sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn normalized(self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if len == 0.0 {
            return self;
        }
        Self::new(self.x / len, self.y / len, self.z / len)
    }
}

/// Longitude in [-pi, pi] and latitude in [-pi/2, pi/2] to source pixels.
pub(crate) fn spherical_to_equirect(theta: f64, phi: f64, source: Resolution) -> (f64, f64) {
    let u = (theta + PI) / (2.0 * PI) * source.width as f64;
    let v = (FRAC_PI_2 - phi) / PI * source.height as f64;
    (u, v)
}

/// Unit direction to equirectangular source pixels.
pub(crate) fn equirect_coords(dir: Vec3, source: Resolution) -> (f64, f64) {
    let theta = dir.x.atan2(dir.z);
    let phi = dir.y.clamp(-1.0, 1.0).asin();
    spherical_to_equirect(theta, phi, source)
}

/// Geometry is computed against equirectangular frames only; other layouts
/// are normalized by the encoding collaborator first.
pub(crate) fn ensure_equirectangular(projection: ProjectionType) -> MediaResult<()> {
    match projection {
        ProjectionType::Equirectangular => Ok(()),
        ProjectionType::HalfEquirectangular
        | ProjectionType::Cubemap { .. }
        | ProjectionType::Eac
        | ProjectionType::Fisheye
        | ProjectionType::DualFisheye
        | ProjectionType::Cylindrical
        | ProjectionType::Stereographic
        | ProjectionType::Pannini
        | ProjectionType::Mercator
        | ProjectionType::Flat
        | ProjectionType::Unknown => Err(MediaError::UnsupportedProjection(projection)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equirect_coords_cardinal_directions() {
        let source = Resolution::new(360, 180);

        let (u, v) = equirect_coords(Vec3::new(0.0, 0.0, 1.0), source);
        assert!((u - 180.0).abs() < 1e-9 && (v - 90.0).abs() < 1e-9);

        let (u, _) = equirect_coords(Vec3::new(1.0, 0.0, 0.0), source);
        assert!((u - 270.0).abs() < 1e-9);

        let (_, v) = equirect_coords(Vec3::new(0.0, 1.0, 0.0), source);
        assert!(v.abs() < 1e-9);

        let (_, v) = equirect_coords(Vec3::new(0.0, -1.0, 0.0), source);
        assert!((v - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_only_equirectangular_is_accepted() {
        for projection in ProjectionType::ALL {
            let accepted = ensure_equirectangular(*projection).is_ok();
            assert_eq!(accepted, *projection == ProjectionType::Equirectangular);
        }
    }

    #[test]
    fn test_normalized() {
        let v = Vec3::new(3.0, 0.0, 4.0).normalized();
        assert!((v.x - 0.6).abs() < 1e-12 && (v.z - 0.8).abs() < 1e-12);
        assert_eq!(Vec3::new(0.0, 0.0, 0.0).normalized(), Vec3::new(0.0, 0.0, 0.0));
    }
}
