//! Remap grids: per-output-pixel source coordinates.

use ndarray::Array2;
use rayon::prelude::*;
use vr360_models::Resolution;

use crate::error::{MediaError, MediaResult};

/// Source sample for one output pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Sample {
    pub u: f64,
    pub v: f64,
    pub masked: bool,
}

impl Sample {
    pub fn at(u: f64, v: f64) -> Self {
        Self { u, v, masked: false }
    }

    pub fn masked(u: f64, v: f64) -> Self {
        Self { u, v, masked: true }
    }
}

/// Lookup table mapping each output pixel to a fractional source position.
///
/// Every stored coordinate satisfies `0 <= u <= source.width - 1` and
/// `0 <= v <= source.height - 1`. Masked pixels keep a valid coordinate but
/// are rendered as background instead of being sampled.
#[derive(Debug, Clone)]
pub struct RemapGrid {
    u: Array2<f32>,
    v: Array2<f32>,
    mask: Option<Array2<bool>>,
    source: Resolution,
}

impl RemapGrid {
    /// Evaluate `sample` for every output pixel, rows in parallel.
    pub(crate) fn build<F>(source: Resolution, output: Resolution, sample: F) -> MediaResult<Self>
    where
        F: Fn(u32, u32) -> Sample + Sync,
    {
        ensure_nonempty("source", source)?;
        ensure_nonempty("output", output)?;

        let width = output.width as usize;
        let height = output.height as usize;
        let max_u = (source.width - 1) as f64;
        let max_v = (source.height - 1) as f64;

        let mut u = vec![0f32; width * height];
        let mut v = vec![0f32; width * height];
        let mut mask = vec![false; width * height];

        u.par_chunks_mut(width)
            .zip(v.par_chunks_mut(width))
            .zip(mask.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, ((u_row, v_row), mask_row))| {
                for x in 0..width {
                    let s = sample(x as u32, y as u32);
                    u_row[x] = clamp_coord(s.u, max_u);
                    v_row[x] = clamp_coord(s.v, max_v);
                    mask_row[x] = s.masked;
                }
            });

        let any_masked = mask.iter().any(|m| *m);
        let shape = (height, width);

        Ok(Self {
            u: Array2::from_shape_vec(shape, u).map_err(|e| MediaError::internal(e.to_string()))?,
            v: Array2::from_shape_vec(shape, v).map_err(|e| MediaError::internal(e.to_string()))?,
            mask: if any_masked {
                Some(Array2::from_shape_vec(shape, mask).map_err(|e| MediaError::internal(e.to_string()))?)
            } else {
                None
            },
            source,
        })
    }

    /// Output width in pixels.
    pub fn width(&self) -> u32 {
        self.u.ncols() as u32
    }

    /// Output height in pixels.
    pub fn height(&self) -> u32 {
        self.u.nrows() as u32
    }

    /// Source frame size the grid was built for.
    pub fn source(&self) -> Resolution {
        self.source
    }

    /// Horizontal source coordinates, indexed `[row, column]`.
    pub fn u(&self) -> &Array2<f32> {
        &self.u
    }

    /// Vertical source coordinates, indexed `[row, column]`.
    pub fn v(&self) -> &Array2<f32> {
        &self.v
    }

    /// Source position for output pixel (x, y); `None` when masked or out of range.
    pub fn lookup(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        let idx = [y as usize, x as usize];
        if self.is_masked(x, y) {
            return None;
        }
        Some((*self.u.get(idx)?, *self.v.get(idx)?))
    }

    pub fn is_masked(&self, x: u32, y: u32) -> bool {
        self.mask
            .as_ref()
            .and_then(|m| m.get([y as usize, x as usize]).copied())
            .unwrap_or(false)
    }

    /// Number of masked output pixels.
    pub fn masked_count(&self) -> usize {
        self.mask
            .as_ref()
            .map(|m| m.iter().filter(|v| **v).count())
            .unwrap_or(0)
    }
}

fn ensure_nonempty(what: &str, size: Resolution) -> MediaResult<()> {
    if size.width == 0 || size.height == 0 {
        return Err(MediaError::invalid_dimensions(format!(
            "{} size must be positive, got {}",
            what, size
        )));
    }
    Ok(())
}

fn clamp_coord(value: f64, max: f64) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_clamps_coordinates() {
        let grid = RemapGrid::build(Resolution::new(10, 5), Resolution::new(4, 3), |x, y| {
            Sample::at(x as f64 * 100.0 - 50.0, f64::NAN + y as f64)
        })
        .unwrap();

        assert_eq!(grid.width(), 4);
        assert_eq!(grid.height(), 3);
        assert!(grid.u().iter().all(|u| (0.0..=9.0).contains(u)));
        assert!(grid.v().iter().all(|v| *v == 0.0));
        assert_eq!(grid.lookup(0, 0), Some((0.0, 0.0)));
        assert_eq!(grid.lookup(3, 2), Some((9.0, 0.0)));
    }

    #[test]
    fn test_mask_is_only_stored_when_used() {
        let plain = RemapGrid::build(Resolution::new(2, 2), Resolution::new(2, 2), |_, _| {
            Sample::at(0.5, 0.5)
        })
        .unwrap();
        assert_eq!(plain.masked_count(), 0);

        let masked = RemapGrid::build(Resolution::new(2, 2), Resolution::new(2, 2), |x, _| {
            if x == 0 {
                Sample::masked(0.0, 0.0)
            } else {
                Sample::at(1.0, 1.0)
            }
        })
        .unwrap();
        assert_eq!(masked.masked_count(), 2);
        assert!(masked.is_masked(0, 1));
        assert_eq!(masked.lookup(0, 1), None);
        assert_eq!(masked.lookup(1, 1), Some((1.0, 1.0)));
    }

    #[test]
    fn test_empty_sizes_are_rejected() {
        let err = RemapGrid::build(Resolution::new(0, 2), Resolution::new(2, 2), |_, _| {
            Sample::at(0.0, 0.0)
        });
        assert!(matches!(err, Err(MediaError::InvalidDimensions(_))));
    }
}
