//! # Frame container
//!
//! A `Frame` is an owned camera image in one of the pixel layouts the camera can deliver. The
//! stages only ever borrow a frame for the duration of a single call.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{imageops, Bgr, DynamicImage, GrayImage, ImageBuffer, RgbImage};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// 8-bit BGR image, the layout most USB cameras deliver.
pub type BgrImage = ImageBuffer<Bgr<u8>, Vec<u8>>;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A single camera frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// 8-bit grayscale
    Luma(GrayImage),

    /// 8-bit RGB
    Rgb(RgbImage),

    /// 8-bit BGR
    Bgr(BgrImage),
}

/// Errors raised when a frame violates the input contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFrameError {
    #[error("The frame is empty")]
    Empty,

    #[error("Expected a frame of {expected:?} pixels, found {found:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Frame {
    /// Build a frame from a decoded image.
    ///
    /// Grayscale, RGB and BGR images are kept in their own layout, anything else (alpha
    /// channels, 16-bit data) is converted to 8-bit RGB.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(g) => Frame::Luma(g),
            DynamicImage::ImageRgb8(c) => Frame::Rgb(c),
            DynamicImage::ImageBgr8(c) => Frame::Bgr(c),
            other => Frame::Rgb(other.to_rgb8()),
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    /// Width and height of the frame in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Frame::Luma(i) => i.dimensions(),
            Frame::Rgb(i) => i.dimensions(),
            Frame::Bgr(i) => i.dimensions(),
        }
    }

    /// True if the frame has no pixels.
    pub fn is_empty(&self) -> bool {
        let (w, h) = self.dimensions();
        w == 0 || h == 0
    }

    /// Check the frame against the expected dimensions.
    pub fn check_dimensions(&self, expected: (u32, u32)) -> Result<(), InvalidFrameError> {
        if self.is_empty() {
            return Err(InvalidFrameError::Empty);
        }

        let found = self.dimensions();
        if found != expected {
            return Err(InvalidFrameError::DimensionMismatch { expected, found });
        }

        Ok(())
    }

    /// Convert the frame into a single channel intensity image.
    pub fn to_intensity(&self) -> GrayImage {
        match self {
            Frame::Luma(i) => i.clone(),
            Frame::Rgb(i) => imageops::grayscale(i),
            Frame::Bgr(i) => imageops::grayscale(i),
        }
    }
}
