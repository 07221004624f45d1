//! Viewport and thumbnail extraction from decoded equirectangular frames.

use std::collections::BTreeMap;

use image::{Rgb, RgbImage};
use rayon::prelude::*;
use tracing::debug;
use vr360_models::{ProjectionType, Resolution, ViewingAngle, ViewportConfig};

use crate::error::{MediaError, MediaResult};
use crate::geometry::{RemapCache, RemapGrid};

/// Fill color for masked pixels.
pub const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// Regions below this motion intensity are never dominant.
pub const DOMINANT_MOTION_THRESHOLD: f64 = 0.3;

/// Maximum number of dominant regions reported.
pub const MAX_DOMINANT_REGIONS: usize = 3;

/// Thumbnail rendering options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailOptions {
    /// Edge length of the square thumbnails.
    pub size: u32,
    /// Horizontal field of view of directional thumbnails.
    pub fov: f64,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self { size: 512, fov: 90.0 }
    }
}

/// Resample `frame` through `grid` with bilinear interpolation.
///
/// The frame must have the size the grid was built for.
pub fn remap_frame(frame: &RgbImage, grid: &RemapGrid) -> MediaResult<RgbImage> {
    let source = grid.source();
    if frame.width() != source.width || frame.height() != source.height {
        return Err(MediaError::invalid_dimensions(format!(
            "frame is {}x{} but grid expects {}",
            frame.width(),
            frame.height(),
            source
        )));
    }

    let width = grid.width() as usize;
    let mut buffer = vec![0u8; width * grid.height() as usize * 3];

    buffer
        .par_chunks_mut(width * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let pixel = match grid.lookup(x as u32, y as u32) {
                    Some((u, v)) => bilinear(frame, u, v),
                    None => BACKGROUND,
                };
                row[x * 3..x * 3 + 3].copy_from_slice(&pixel.0);
            }
        });

    RgbImage::from_raw(grid.width(), grid.height(), buffer)
        .ok_or_else(|| MediaError::internal("remap buffer size mismatch"))
}

fn bilinear(frame: &RgbImage, u: f32, v: f32) -> Rgb<u8> {
    let max_x = frame.width() - 1;
    let max_y = frame.height() - 1;

    let x0 = (u.floor() as u32).min(max_x);
    let y0 = (v.floor() as u32).min(max_y);
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);
    let fx = u - x0 as f32;
    let fy = v - y0 as f32;

    let p00 = frame.get_pixel(x0, y0).0;
    let p10 = frame.get_pixel(x1, y0).0;
    let p01 = frame.get_pixel(x0, y1).0;
    let p11 = frame.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Render one viewport of an equirectangular frame.
pub fn extract_viewport(
    frame: &RgbImage,
    viewport: &ViewportConfig,
    cache: &RemapCache,
) -> MediaResult<RgbImage> {
    viewport.validate()?;
    let source = Resolution::new(frame.width(), frame.height());
    let grid = cache.viewport_grid(ProjectionType::Equirectangular, viewport, source)?;
    remap_frame(frame, &grid)
}

/// Render the requested named angles of an equirectangular frame.
///
/// Returns exactly one image per distinct requested angle. Angles render in
/// parallel; grids come from `cache`.
pub fn extract_named_viewports(
    frame: &RgbImage,
    angles: &[ViewingAngle],
    options: &ThumbnailOptions,
    cache: &RemapCache,
) -> MediaResult<BTreeMap<ViewingAngle, RgbImage>> {
    let source = Resolution::new(frame.width(), frame.height());
    let size = Resolution::new(options.size, options.size);

    let rendered = angles
        .par_iter()
        .map(|angle| {
            let grid = match angle {
                ViewingAngle::Stereographic => cache.stereographic_grid(source, size)?,
                directional => {
                    let viewport = ViewportConfig::for_angle(*directional, options.fov, options.size);
                    cache.viewport_grid(ProjectionType::Equirectangular, &viewport, source)?
                }
            };
            debug!(angle = %angle, size = options.size, "Rendering viewport thumbnail");
            Ok((*angle, remap_frame(frame, &grid)?))
        })
        .collect::<MediaResult<Vec<_>>>()?;

    Ok(rendered.into_iter().collect())
}

/// Pick the regions with the most motion.
///
/// Directions are ranked by intensity (ties in canonical order front, back,
/// left, right, up, down), those above [`DOMINANT_MOTION_THRESHOLD`] are kept
/// and at most [`MAX_DOMINANT_REGIONS`] are returned. Front is always present:
/// if it did not qualify it is placed first and the list truncated.
pub fn select_dominant_regions(region_motion: &BTreeMap<ViewingAngle, f64>) -> Vec<ViewingAngle> {
    let mut ranked: Vec<(ViewingAngle, f64)> = ViewingAngle::DIRECTIONS
        .iter()
        .map(|angle| {
            let intensity = region_motion.get(angle).copied().unwrap_or(0.0);
            (*angle, if intensity.is_nan() { 0.0 } else { intensity })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.0.canonical_rank().cmp(&b.0.canonical_rank()))
    });

    let mut regions: Vec<ViewingAngle> = ranked
        .into_iter()
        .filter(|(_, intensity)| *intensity > DOMINANT_MOTION_THRESHOLD)
        .take(MAX_DOMINANT_REGIONS)
        .map(|(angle, _)| angle)
        .collect();

    if !regions.contains(&ViewingAngle::Front) {
        regions.insert(0, ViewingAngle::Front);
        regions.truncate(MAX_DOMINANT_REGIONS);
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Sample;

    /// Equirectangular test frame: red channel encodes column, green encodes row.
    fn gradient_frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / (width - 1)) as u8,
                (y * 255 / (height - 1)) as u8,
                128,
            ])
        })
    }

    #[test]
    fn test_identity_grid_reproduces_frame() {
        let frame = gradient_frame(8, 4);
        let grid = RemapGrid::build(Resolution::new(8, 4), Resolution::new(8, 4), |x, y| {
            Sample::at(x as f64, y as f64)
        })
        .unwrap();
        assert_eq!(remap_frame(&frame, &grid).unwrap(), frame);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let frame = RgbImage::from_fn(2, 1, |x, _| if x == 0 { Rgb([0, 0, 0]) } else { Rgb([200, 100, 50]) });
        assert_eq!(bilinear(&frame, 0.5, 0.0), Rgb([100, 50, 25]));
        assert_eq!(bilinear(&frame, 1.0, 0.0), Rgb([200, 100, 50]));
    }

    #[test]
    fn test_frame_size_mismatch_is_rejected() {
        let cache = RemapCache::new(4);
        let grid = cache.stereographic_grid(Resolution::new(16, 8), Resolution::new(4, 4)).unwrap();
        let err = remap_frame(&gradient_frame(32, 16), &grid).unwrap_err();
        assert!(matches!(err, MediaError::InvalidDimensions(_)));
    }

    #[test]
    fn test_named_viewports_have_requested_keys() {
        let frame = gradient_frame(128, 64);
        let cache = RemapCache::new(16);
        let options = ThumbnailOptions { size: 24, fov: 90.0 };
        let angles = [ViewingAngle::Front, ViewingAngle::Up, ViewingAngle::Stereographic];

        let thumbs = extract_named_viewports(&frame, &angles, &options, &cache).unwrap();

        assert_eq!(thumbs.keys().copied().collect::<Vec<_>>(), {
            let mut expected = angles.to_vec();
            expected.sort();
            expected
        });
        for image in thumbs.values() {
            assert_eq!(image.dimensions(), (24, 24));
        }
        // the little planet has a black border
        assert_eq!(*thumbs[&ViewingAngle::Stereographic].get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn test_front_thumbnail_centers_on_frame_center() {
        let frame = gradient_frame(256, 128);
        let cache = RemapCache::new(4);
        let thumbs = extract_named_viewports(
            &frame,
            &[ViewingAngle::Front, ViewingAngle::Back],
            &ThumbnailOptions { size: 16, fov: 60.0 },
            &cache,
        )
        .unwrap();

        let center = thumbs[&ViewingAngle::Front].get_pixel(8, 8);
        assert!((center.0[0] as i32 - 128).abs() <= 2, "red = {}", center.0[0]);
        assert!((center.0[1] as i32 - 128).abs() <= 3, "green = {}", center.0[1]);

        // back looks at the seam: far left or far right of the source
        let back = thumbs[&ViewingAngle::Back].get_pixel(8, 8);
        assert!(back.0[0] < 10 || back.0[0] > 245, "red = {}", back.0[0]);
    }

    #[test]
    fn test_invalid_viewport_fails_before_rendering() {
        let cache = RemapCache::new(4);
        let vp = ViewportConfig::looking_at(0.0, 0.0, 200.0, 8, 8);
        let err = extract_viewport(&gradient_frame(16, 8), &vp, &cache).unwrap_err();
        assert!(matches!(err, MediaError::Validation(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_dominant_regions_ranked_with_canonical_ties() {
        let motion: BTreeMap<ViewingAngle, f64> = [
            (ViewingAngle::Front, 0.9),
            (ViewingAngle::Up, 0.1),
            (ViewingAngle::Down, 0.05),
            (ViewingAngle::Left, 0.4),
            (ViewingAngle::Right, 0.4),
            (ViewingAngle::Back, 0.2),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            select_dominant_regions(&motion),
            vec![ViewingAngle::Front, ViewingAngle::Left, ViewingAngle::Right]
        );
    }

    #[test]
    fn test_front_is_always_included() {
        let motion: BTreeMap<ViewingAngle, f64> = [
            (ViewingAngle::Back, 0.8),
            (ViewingAngle::Up, 0.7),
            (ViewingAngle::Down, 0.6),
            (ViewingAngle::Left, 0.5),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            select_dominant_regions(&motion),
            vec![ViewingAngle::Front, ViewingAngle::Back, ViewingAngle::Up]
        );
        assert_eq!(select_dominant_regions(&BTreeMap::new()), vec![ViewingAngle::Front]);
    }
}
