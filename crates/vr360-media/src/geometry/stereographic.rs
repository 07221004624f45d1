//! "Little planet" remap grids.

use vr360_models::Resolution;

use super::grid::{RemapGrid, Sample};
use super::spherical_to_equirect;
use crate::error::MediaResult;

/// Build the stereographic (little planet) grid for an equirectangular source.
///
/// The disk is inscribed in the output frame. Pixels outside the unit circle
/// are masked.
pub fn build_stereographic_map(source: Resolution, output: Resolution) -> MediaResult<RemapGrid> {
    let cx = output.width as f64 / 2.0;
    let cy = output.height as f64 / 2.0;
    let radius = cx.min(cy).max(f64::MIN_POSITIVE);

    RemapGrid::build(source, output, |x, y| {
        let xc = (x as f64 - cx) / radius;
        let yc = (y as f64 - cy) / radius;
        let r = xc.hypot(yc);

        let theta = yc.atan2(xc);
        let phi = 2.0 * r.atan();
        let (u, v) = spherical_to_equirect(theta, phi, source);

        if r > 1.0 {
            Sample::masked(u, v)
        } else {
            Sample::at(u, v)
        }
    })
}
