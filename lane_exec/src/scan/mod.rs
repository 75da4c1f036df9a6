//! # Multi-slice scanner
//!
//! Samples the lane mask at a handful of rows instead of fitting lines through the whole image.
//! Each row is split at the vertical centreline and each half is accepted only if it holds enough
//! foreground pixels, which rejects rows dominated by noise.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use serde::{Deserialize, Serialize};

use crate::mask::BinaryMask;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the slice scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParams {
    /// Number of rows to sample (K).
    pub num_slices: usize,

    /// Position of the nearest slice.
    ///
    /// Units: fraction of frame height, 0 at the top
    pub near_fraction: f64,

    /// Position of the furthest slice.
    ///
    /// Units: fraction of frame height, 0 at the top
    pub far_fraction: f64,

    /// Minimum number of foreground pixels for one side of a row to be accepted.
    pub min_side_pixels: usize,

    /// How slices are distributed between the near and far rows.
    pub spacing: SliceSpacing,
}

/// The sample taken from one row of the mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SliceSample {
    /// Row index in the mask.
    pub row: u32,

    /// Mean column of the left side foreground, if accepted.
    pub left_x: Option<f64>,

    /// Mean column of the right side foreground, if accepted.
    pub right_x: Option<f64>,
}

/// The result of scanning one mask.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceScan {
    /// Width of the scanned mask in pixels.
    pub frame_width: u32,

    /// Height of the scanned mask in pixels.
    pub frame_height: u32,

    /// One sample per slice, near to far.
    pub samples: Vec<SliceSample>,
}

/// Samples a lane mask at fixed rows.
#[derive(Debug, Clone)]
pub struct SliceScanner {
    params: ScanParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Distribution of slice rows between the near and far fractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceSpacing {
    /// Rows form a geometric progression, denser in the far field.
    Geometric,

    /// Rows are evenly spaced.
    Linear,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanParamsError {
    #[error("At least one slice is required")]
    NoSlices,

    #[error(
        "Slice fractions must satisfy 0 < far_fraction <= near_fraction <= 1, got near = {near}, \
        far = {far}"
    )]
    InvalidFractions { near: f64, far: f64 },

    #[error("min_side_pixels must be at least 1")]
    ZeroMinSidePixels,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            num_slices: 7,
            near_fraction: 0.9,
            far_fraction: 0.4,
            min_side_pixels: 5,
            spacing: SliceSpacing::Geometric,
        }
    }
}

impl ScanParams {
    pub fn validate(&self) -> Result<(), ScanParamsError> {
        if self.num_slices == 0 {
            return Err(ScanParamsError::NoSlices);
        }
        if !(self.far_fraction > 0.0
            && self.far_fraction <= self.near_fraction
            && self.near_fraction <= 1.0)
        {
            return Err(ScanParamsError::InvalidFractions {
                near: self.near_fraction,
                far: self.far_fraction,
            });
        }
        if self.min_side_pixels == 0 {
            return Err(ScanParamsError::ZeroMinSidePixels);
        }

        Ok(())
    }

    /// The slice positions as fractions of frame height, near to far.
    pub fn slice_fractions(&self) -> Vec<f64> {
        let n = self.num_slices;
        if n == 1 {
            return vec![self.near_fraction];
        }

        (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1) as f64;
                match self.spacing {
                    SliceSpacing::Geometric => {
                        self.near_fraction * (self.far_fraction / self.near_fraction).powf(t)
                    }
                    SliceSpacing::Linear => {
                        self.near_fraction + (self.far_fraction - self.near_fraction) * t
                    }
                }
            })
            .collect()
    }
}

impl SliceScan {
    /// Accepted left side positions, near to far.
    pub fn left_xs(&self) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.left_x).collect()
    }

    /// Accepted right side positions, near to far.
    pub fn right_xs(&self) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.right_x).collect()
    }
}

impl SliceScanner {
    pub fn new(params: ScanParams) -> Result<Self, ScanParamsError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ScanParams {
        &self.params
    }

    /// Row indices sampled for a mask of the given height, near to far.
    pub fn slice_rows(&self, height: u32) -> Vec<u32> {
        if height == 0 {
            return Vec::new();
        }

        self.params
            .slice_fractions()
            .into_iter()
            .map(|f| ((f * height as f64).floor() as u32).min(height - 1))
            .collect()
    }

    /// Sample every slice row of the mask.
    pub fn scan(&self, mask: &BinaryMask) -> SliceScan {
        let (width, height) = mask.dimensions();
        let centre = width / 2;

        let samples: Vec<SliceSample> = self
            .slice_rows(height)
            .into_iter()
            .map(|row| {
                let (left, right): (Vec<u32>, Vec<u32>) = mask
                    .foreground_in_row(row)
                    .into_iter()
                    .partition(|&x| x < centre);

                SliceSample {
                    row,
                    left_x: self.accept(&left),
                    right_x: self.accept(&right),
                }
            })
            .collect();

        trace!(
            "Scanned {} slices: left {:?}, right {:?}",
            samples.len(),
            samples.iter().map(|s| s.left_x).collect::<Vec<_>>(),
            samples.iter().map(|s| s.right_x).collect::<Vec<_>>()
        );

        SliceScan {
            frame_width: width,
            frame_height: height,
            samples,
        }
    }

    /// Mean column of one side of a row, if it has enough pixels.
    fn accept(&self, columns: &[u32]) -> Option<f64> {
        if columns.len() < self.params.min_side_pixels {
            return None;
        }

        let sum: f64 = columns.iter().map(|&x| x as f64).sum();
        Some(sum / columns.len() as f64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Paint a horizontal run of foreground pixels on every row in `rows`.
    fn paint(mask: &mut BinaryMask, rows: std::ops::Range<u32>, xs: std::ops::Range<u32>) {
        for y in rows {
            for x in xs.clone() {
                mask.set(x, y, true);
            }
        }
    }

    #[test]
    fn test_slice_rows_geometric() {
        let scanner = SliceScanner::new(ScanParams::default()).unwrap();
        let rows = scanner.slice_rows(480);

        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0], 432);
        assert_eq!(rows[6], 192);

        // Near to far, and denser towards the far field
        for w in rows.windows(3) {
            assert!(w[0] > w[1]);
            assert!(w[0] - w[1] >= w[1] - w[2]);
        }
    }

    #[test]
    fn test_slice_rows_linear() {
        let scanner = SliceScanner::new(ScanParams {
            spacing: SliceSpacing::Linear,
            num_slices: 6,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(scanner.slice_rows(100), vec![90, 80, 70, 60, 50, 40]);
        assert!(scanner.slice_rows(0).is_empty());
    }

    #[test]
    fn test_scan_accepts_by_pixel_count() {
        let scanner = SliceScanner::new(ScanParams::default()).unwrap();
        let mut mask = BinaryMask::empty(640, 480);

        // Full height marks: 6 pixels on the left, 4 on the right (below the minimum of 5)
        paint(&mut mask, 0..480, 97..103);
        paint(&mut mask, 0..480, 500..504);

        let scan = scanner.scan(&mask);
        assert_eq!(scan.samples.len(), 7);
        assert_eq!(scan.frame_width, 640);

        let left = scan.left_xs();
        assert_eq!(left.len(), 7);
        assert!(left.iter().all(|&x| (x - 99.5).abs() < 1e-9));
        assert!(scan.right_xs().is_empty());
    }

    #[test]
    fn test_scan_splits_at_centre() {
        let scanner = SliceScanner::new(ScanParams::default()).unwrap();
        let mut mask = BinaryMask::empty(640, 480);

        // A mark straddling the centreline contributes to both sides
        paint(&mut mask, 0..480, 310..330);

        let scan = scanner.scan(&mask);
        assert!(scan.left_xs().iter().all(|&x| (x - 314.5).abs() < 1e-9));
        assert!(scan.right_xs().iter().all(|&x| (x - 324.5).abs() < 1e-9));
    }

    #[test]
    fn test_params_validation() {
        assert_eq!(
            ScanParams { num_slices: 0, ..Default::default() }.validate(),
            Err(ScanParamsError::NoSlices)
        );
        assert!(matches!(
            ScanParams { far_fraction: 0.95, ..Default::default() }.validate(),
            Err(ScanParamsError::InvalidFractions { .. })
        ));
        assert_eq!(
            ScanParams { min_side_pixels: 0, ..Default::default() }.validate(),
            Err(ScanParamsError::ZeroMinSidePixels)
        );
    }
}
