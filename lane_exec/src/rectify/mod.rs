//! # Perspective rectifier
//!
//! Remaps a forward facing camera frame into a bird's-eye view of the ground directly ahead of
//! the rover. The homography is computed once from the calibration quadrilaterals when the
//! rectifier is built and never changes afterwards.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod homography;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{Bgr, Luma, Rgb};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use log::debug;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::frame::{Frame, InvalidFrameError};

pub use homography::{apply_homography, solve_homography};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Calibration quadrilaterals for the bird's-eye projection.
///
/// Corners are given in the same order in both quads, conventionally top-left, top-right,
/// bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationGeometry {
    /// Trapezoid on the road surface in raw frame pixels.
    pub src_px: [[f64; 2]; 4],

    /// Rectangle the trapezoid maps onto in bird's-eye pixels.
    pub dst_px: [[f64; 2]; 4],
}

/// Applies the fixed bird's-eye transform to frames of one configured size.
#[derive(Debug, Clone)]
pub struct Rectifier {
    frame_dimensions: (u32, u32),

    homography: Matrix3<f64>,

    /// `None` for the identity transform, in which case frames are copied straight through.
    projection: Option<Projection>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum RectifyError {
    #[error("The {0} quadrilateral has a non-finite corner")]
    NonFiniteCorner(&'static str),

    #[error("Three corners of the {0} quadrilateral are collinear")]
    CollinearCorners(&'static str),

    #[error("The calibration geometry is degenerate: {0}")]
    DegenerateGeometry(&'static str),

    #[error("Frame dimensions must be non-zero, got {0}x{1}")]
    ZeroFrameSize(u32, u32),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Rectifier {
    /// Build a rectifier for frames of `frame_width` x `frame_height` pixels.
    pub fn new(
        geometry: &CalibrationGeometry,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Self, RectifyError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(RectifyError::ZeroFrameSize(frame_width, frame_height));
        }

        let homography = solve_homography(&geometry.src_px, &geometry.dst_px)?;

        // imageproc works in f32, row-major
        let mut transform = [0f32; 9];
        for r in 0..3 {
            for c in 0..3 {
                transform[3 * r + c] = homography[(r, c)] as f32;
            }
        }

        let projection = Projection::from_matrix(transform).ok_or(
            RectifyError::DegenerateGeometry("the homography is not invertible in f32"),
        )?;

        debug!("Rectifier homography: {}", homography);

        Ok(Self {
            frame_dimensions: (frame_width, frame_height),
            homography,
            projection: Some(projection),
        })
    }

    /// Build a rectifier which leaves frames untouched, for cameras that already look straight
    /// down at the road.
    pub fn identity(frame_width: u32, frame_height: u32) -> Result<Self, RectifyError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(RectifyError::ZeroFrameSize(frame_width, frame_height));
        }

        Ok(Self {
            frame_dimensions: (frame_width, frame_height),
            homography: Matrix3::identity(),
            projection: None,
        })
    }

    /// The raw frame to bird's-eye homography.
    pub fn homography(&self) -> &Matrix3<f64> {
        &self.homography
    }

    /// Frame dimensions this rectifier accepts.
    pub fn frame_dimensions(&self) -> (u32, u32) {
        self.frame_dimensions
    }

    /// Map a raw frame pixel position into bird's-eye coordinates.
    pub fn project_point(&self, point_px: [f64; 2]) -> Option<[f64; 2]> {
        apply_homography(&self.homography, point_px)
    }

    /// Project a frame into the bird's-eye view.
    ///
    /// The output has the same size and pixel layout as the input. Output pixels whose source
    /// lies outside the raw frame are black.
    pub fn rectify(&self, frame: &Frame) -> Result<Frame, InvalidFrameError> {
        frame.check_dimensions(self.frame_dimensions)?;

        let projection = match self.projection {
            Some(ref p) => p,
            None => return Ok(frame.clone()),
        };

        Ok(match frame {
            Frame::Luma(i) => Frame::Luma(warp(i, projection, Interpolation::Bilinear, Luma([0]))),
            Frame::Rgb(i) => {
                Frame::Rgb(warp(i, projection, Interpolation::Bilinear, Rgb([0, 0, 0])))
            }
            Frame::Bgr(i) => {
                Frame::Bgr(warp(i, projection, Interpolation::Bilinear, Bgr([0, 0, 0])))
            }
        })
    }
}
