//! # Binary lane mask extractor
//!
//! Converts a rectified frame into a foreground/background mask isolating the lane markings:
//!
//!  1. Convert to single channel intensity
//!  2. Discard rows above the region of interest (far field pixels are unreliable after
//!     projection)
//!  3. Blur to suppress floor texture
//!  4. Adaptive threshold against a locally weighted mean
//!  5. Morphological closing to bridge dashed markings, then an opening to remove speckle
//!
//! Blurs in steps 3 and 4 are normalised by the blurred region of interest, so the discarded
//! rows do not bleed into the first rows of the region and create a false edge there. Both blurs
//! only run over the region plus a margin of discarded rows as wide as the larger kernel radius,
//! and the blurred region indicators are computed once per frame size.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{imageops, GrayImage, Luma};
use imageproc::{
    distance_transform::Norm,
    filter::gaussian_blur_f32,
    morphology::{close, open},
};
use log::trace;

use crate::frame::Frame;

pub use params::*;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Mask value of a marking pixel.
pub const FOREGROUND: u8 = 255;

/// Mask value of a floor pixel.
pub const BACKGROUND: u8 = 0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Per pixel marking/floor classification of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    image: GrayImage,
}

/// Extracts binary lane masks from rectified frames.
#[derive(Debug, Clone)]
pub struct MaskExtractor {
    params: MaskParams,

    /// Normalising weights for the expected frame size, if it is known.
    weights: Option<RoiWeights>,
}

/// Region of interest indicator and its blurs for one frame size.
///
/// Everything is stored over the processed band only, which starts `roi_top - band_top` rows
/// above the ROI.
#[derive(Debug, Clone)]
struct RoiWeights {
    width: u32,
    height: u32,

    /// First ROI row of the full frame.
    roi_top: u32,

    /// First row of the full frame inside the band.
    band_top: u32,

    /// 255 inside the ROI, 0 in the margin.
    roi: GrayImage,

    /// `roi` blurred with the smoothing sigma, `None` if smoothing is disabled.
    smooth_den: Option<GrayImage>,

    /// `roi` blurred with the threshold sigma.
    mean_den: GrayImage,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BinaryMask {
    /// A mask of the given size with no foreground.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([BACKGROUND])),
        }
    }

    /// Build a mask from a grayscale image, any non-zero pixel is foreground.
    pub fn from_gray(mut image: GrayImage) -> Self {
        for p in image.pixels_mut() {
            if p[0] != BACKGROUND {
                p[0] = FOREGROUND;
            }
        }

        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// True if the mask holds no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Whether the pixel is foreground. Positions outside the mask are background.
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.image.get_pixel(x, y)[0] != BACKGROUND
    }

    /// Set a single pixel. Positions outside the mask are ignored.
    pub fn set(&mut self, x: u32, y: u32, foreground: bool) {
        if x < self.width() && y < self.height() {
            let v = if foreground { FOREGROUND } else { BACKGROUND };
            self.image.put_pixel(x, y, Luma([v]));
        }
    }

    /// Columns of all foreground pixels in row `y`, in ascending order.
    pub fn foreground_in_row(&self, y: u32) -> Vec<u32> {
        if y >= self.height() {
            return Vec::new();
        }

        (0..self.width())
            .filter(|&x| self.image.get_pixel(x, y)[0] != BACKGROUND)
            .collect()
    }

    /// Total number of foreground pixels.
    pub fn foreground_count(&self) -> usize {
        self.image.pixels().filter(|p| p[0] != BACKGROUND).count()
    }

    /// Borrow the underlying image (255 = foreground, 0 = background).
    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }
}

impl RoiWeights {
    fn new(params: &MaskParams, width: u32, height: u32, roi_top: u32) -> Self {
        let smoothing = params.blur_sigma > 0.0;
        let threshold_sigma = params.threshold_sigma();

        // Rows a blur kernel reaches, so every ROI pixel sees the same zeros as in the full frame
        let mut radius = kernel_radius(threshold_sigma);
        if smoothing {
            radius = radius.max(kernel_radius(params.blur_sigma));
        }
        let band_top = roi_top.saturating_sub(radius);
        let margin = roi_top - band_top;

        let roi = GrayImage::from_fn(width, height - band_top, |_, y| {
            if y < margin { Luma([0]) } else { Luma([255]) }
        });

        let smooth_den = if smoothing {
            Some(gaussian_blur_f32(&roi, params.blur_sigma))
        } else {
            None
        };
        let mean_den = gaussian_blur_f32(&roi, threshold_sigma);

        Self {
            width,
            height,
            roi_top,
            band_top,
            roi,
            smooth_den,
            mean_den,
        }
    }

    fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

impl MaskExtractor {
    /// Build an extractor which prepares its blur weights for each frame it is given.
    pub fn new(params: MaskParams) -> Result<Self, MaskParamsError> {
        params.validate()?;
        Ok(Self { params, weights: None })
    }

    /// Build an extractor with the blur weights for `width` x `height` frames prepared up front.
    ///
    /// Frames of any other size are still accepted, at the cost of preparing their weights on
    /// every call.
    pub fn with_frame_size(
        params: MaskParams,
        width: u32,
        height: u32,
    ) -> Result<Self, MaskParamsError> {
        let mut extractor = Self::new(params)?;
        if width > 0 && height > 0 {
            extractor.weights = Some(extractor.prepare(width, height));
        }
        Ok(extractor)
    }

    /// Blur weights for a non-empty frame size.
    fn prepare(&self, width: u32, height: u32) -> RoiWeights {
        RoiWeights::new(&self.params, width, height, self.roi_top_row(height))
    }

    pub fn params(&self) -> &MaskParams {
        &self.params
    }

    /// First row inside the region of interest for a frame of the given height.
    pub fn roi_top_row(&self, height: u32) -> u32 {
        ((self.params.roi_top_fraction * height as f64).floor() as u32).min(height)
    }

    /// Run all extraction steps on the frame.
    ///
    /// An empty frame produces an empty mask.
    pub fn extract(&self, frame: &Frame) -> BinaryMask {
        if frame.is_empty() {
            return BinaryMask::empty(0, 0);
        }

        // ---- INTENSITY AND ROI ----

        let gray = frame.to_intensity();
        let (width, height) = gray.dimensions();

        let prepared;
        let weights = match self.weights {
            Some(ref w) if w.matches(width, height) => w,
            _ => {
                prepared = self.prepare(width, height);
                &prepared
            }
        };

        let roi_top = weights.roi_top;
        let band_top = weights.band_top;
        let margin = roi_top - band_top;

        let mut band = imageops::crop_imm(&gray, 0, band_top, width, height - band_top).to_image();
        for y in 0..margin {
            for x in 0..width {
                band.put_pixel(x, y, Luma([0]));
            }
        }

        // ---- SMOOTHING ----

        let smoothed = match weights.smooth_den {
            Some(ref den) => roi_weighted_blur(&band, &weights.roi, den, self.params.blur_sigma),
            None => band,
        };

        // ---- ADAPTIVE THRESHOLD ----

        let local_mean = roi_weighted_blur(
            &smoothed,
            &weights.roi,
            &weights.mean_den,
            self.params.threshold_sigma(),
        );
        let bias = self.params.threshold_bias;
        let polarity = self.params.polarity;

        let mut mask = GrayImage::from_fn(width, height, |x, y| {
            if y < roi_top {
                return Luma([BACKGROUND]);
            }

            let p = smoothed.get_pixel(x, y - band_top)[0] as f32;
            let m = local_mean.get_pixel(x, y - band_top)[0] as f32;

            let is_marking = match polarity {
                MarkingPolarity::DarkOnLight => p < m - bias,
                MarkingPolarity::LightOnDark => p > m + bias,
            };

            if is_marking { Luma([FOREGROUND]) } else { Luma([BACKGROUND]) }
        });

        // ---- MORPHOLOGY ----

        if self.params.close_radius > 0 {
            mask = close(&mask, Norm::LInf, self.params.close_radius);
        }
        if self.params.open_radius > 0 {
            mask = open(&mask, Norm::LInf, self.params.open_radius);
        }

        // Closing may have grown markings back over the ROI edge
        for y in 0..roi_top {
            for x in 0..width {
                mask.put_pixel(x, y, Luma([BACKGROUND]));
            }
        }

        let mask = BinaryMask { image: mask };

        trace!(
            "Mask extracted: {} foreground pixels, ROI from row {}",
            mask.foreground_count(),
            roi_top
        );

        mask
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Gaussian blur of `image` restricted to the region where `roi` is non-zero.
///
/// Each output pixel is the Gaussian weighted mean of the ROI pixels around it, pixels outside
/// the ROI are zero. `image` must already be zero outside the ROI, and `den` is `roi` blurred
/// with the same sigma.
fn roi_weighted_blur(
    image: &GrayImage,
    roi: &GrayImage,
    den: &GrayImage,
    sigma: f32,
) -> GrayImage {
    let num = gaussian_blur_f32(image, sigma);

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if roi.get_pixel(x, y)[0] == 0 {
            return Luma([0]);
        }

        let d = den.get_pixel(x, y)[0] as f32;
        if d <= 0.0 {
            return Luma([image.get_pixel(x, y)[0]]);
        }

        let v = num.get_pixel(x, y)[0] as f32 * 255.0 / d;
        Luma([v.round().max(0.0).min(255.0) as u8])
    })
}

/// Number of rows either side of a pixel that `gaussian_blur_f32` reads.
fn kernel_radius(sigma: f32) -> u32 {
    (2.0 * sigma).ceil() as u32
}

#[cfg(test)]
mod test {
    use super::*;

    const W: u32 = 160;
    const H: u32 = 120;

    /// Light floor with two dark vertical stripes.
    fn striped_frame(floor: u8, stripe: u8) -> Frame {
        Frame::Luma(GrayImage::from_fn(W, H, |x, _| {
            if (30..36).contains(&x) || (124..130).contains(&x) {
                Luma([stripe])
            } else {
                Luma([floor])
            }
        }))
    }

    #[test]
    fn test_dark_on_light_stripes() {
        let ex = MaskExtractor::new(MaskParams::default()).unwrap();
        let mask = ex.extract(&striped_frame(200, 30));
        let roi_top = ex.roi_top_row(H);

        assert_eq!(mask.dimensions(), (W, H));

        // Nothing survives above the ROI
        for y in 0..roi_top {
            assert!(mask.foreground_in_row(y).is_empty(), "row {} has foreground", y);
        }

        // Both stripes are found in the ROI and the plain floor is background
        let y = (H as f64 * 0.8) as u32;
        assert!(mask.is_foreground(32, y));
        assert!(mask.is_foreground(127, y));
        assert!(!mask.is_foreground(80, y));
        assert!(!mask.is_foreground(5, y));

        // The first ROI rows must not pick up an edge from the discarded region
        for x in 40..120 {
            assert!(!mask.is_foreground(x, roi_top));
            assert!(!mask.is_foreground(x, roi_top + 2));
        }
    }

    #[test]
    fn test_polarity_matters() {
        let light = MaskExtractor::new(MaskParams {
            polarity: MarkingPolarity::LightOnDark,
            ..Default::default()
        })
        .unwrap();

        // Dark stripes on a light floor are not light markings
        let mask = light.extract(&striped_frame(200, 30));
        let y = (H as f64 * 0.8) as u32;
        assert!(!mask.is_foreground(32, y));

        // But light stripes on a dark floor are
        let mask = light.extract(&striped_frame(40, 220));
        assert!(mask.is_foreground(32, y));
        assert!(mask.is_foreground(127, y));
        assert!(!mask.is_foreground(80, y));
        for x in 40..120 {
            assert!(!mask.is_foreground(x, light.roi_top_row(H) + 2));
        }
    }

    #[test]
    fn test_uniform_frame_has_no_foreground() {
        let ex = MaskExtractor::new(MaskParams::default()).unwrap();
        let mask = ex.extract(&Frame::Luma(GrayImage::from_pixel(W, H, Luma([128]))));
        assert_eq!(mask.foreground_count(), 0);
    }

    #[test]
    fn test_closing_bridges_small_gaps() {
        let ex = MaskExtractor::new(MaskParams::default()).unwrap();

        // A dashed stripe with 2 pixel gaps every 10 rows
        let frame = Frame::Luma(GrayImage::from_fn(W, H, |x, y| {
            if (30..36).contains(&x) && y % 10 >= 2 { Luma([30]) } else { Luma([200]) }
        }));
        let mask = ex.extract(&frame);

        let roi_top = ex.roi_top_row(H);
        for y in (roi_top + 4)..(H - 4) {
            assert!(mask.is_foreground(32, y), "gap left open at row {}", y);
        }
    }

    /// Floor texture that differs in every row and column.
    fn textured(x: u32, y: u32) -> u8 {
        ((x * 7 + y * 13 + (x * y) % 17) % 256) as u8
    }

    #[test]
    fn test_band_blur_matches_full_frame_blur() {
        let params = MaskParams::default();
        let ex = MaskExtractor::new(params.clone()).unwrap();
        let roi_top = ex.roi_top_row(H);
        let weights = ex.prepare(W, H);
        assert!(weights.band_top < roi_top);

        // Full frame reference, zero above the ROI
        let full_roi = GrayImage::from_fn(W, H, |_, y| {
            if y < roi_top { Luma([0]) } else { Luma([255]) }
        });
        let full = GrayImage::from_fn(W, H, |x, y| {
            if y < roi_top { Luma([0]) } else { Luma([textured(x, y)]) }
        });
        let band = GrayImage::from_fn(W, H - weights.band_top, |x, y| {
            Luma([full.get_pixel(x, y + weights.band_top)[0]])
        });

        let sigma = params.threshold_sigma();
        let expected = roi_weighted_blur(
            &full,
            &full_roi,
            &gaussian_blur_f32(&full_roi, sigma),
            sigma,
        );
        let found = roi_weighted_blur(&band, &weights.roi, &weights.mean_den, sigma);

        for y in roi_top..H {
            for x in 0..W {
                assert_eq!(
                    found.get_pixel(x, y - weights.band_top),
                    expected.get_pixel(x, y),
                    "pixel ({}, {})",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn test_prepared_weights_give_same_mask() {
        let params = MaskParams::default();
        let lazy = MaskExtractor::new(params.clone()).unwrap();
        let prepared = MaskExtractor::with_frame_size(params, W, H).unwrap();
        assert!(prepared.weights.is_some());

        let frame = Frame::Luma(GrayImage::from_fn(W, H, |x, y| {
            if (30..36).contains(&x) || (124..130).contains(&x) {
                Luma([30])
            } else {
                Luma([150 + textured(x, y) / 8])
            }
        }));
        assert_eq!(prepared.extract(&frame), lazy.extract(&frame));
        assert!(prepared.extract(&frame).foreground_count() > 0);

        // Other frame sizes still work
        let small = Frame::Luma(GrayImage::from_fn(W / 2, H / 2, |x, _| {
            if (30..36).contains(&x) { Luma([30]) } else { Luma([200]) }
        }));
        let mask = prepared.extract(&small);
        assert_eq!(mask.dimensions(), (W / 2, H / 2));
        assert_eq!(mask, lazy.extract(&small));
        assert!(mask.is_foreground(32, (H as f64 * 0.4) as u32));
    }

    #[test]
    fn test_empty_frame_gives_empty_mask() {
        let ex = MaskExtractor::new(MaskParams::default()).unwrap();
        let mask = ex.extract(&Frame::Luma(GrayImage::new(0, 0)));
        assert!(mask.is_empty());
        assert_eq!(mask.foreground_count(), 0);
    }

    #[test]
    fn test_binary_mask_accessors() {
        let mut mask = BinaryMask::empty(10, 4);
        mask.set(2, 1, true);
        mask.set(7, 1, true);
        mask.set(20, 1, true);

        assert_eq!(mask.foreground_in_row(1), vec![2, 7]);
        assert_eq!(mask.foreground_in_row(9), Vec::<u32>::new());
        assert_eq!(mask.foreground_count(), 2);
        assert!(!mask.is_foreground(20, 1));

        let from = BinaryMask::from_gray(GrayImage::from_pixel(3, 3, Luma([7])));
        assert_eq!(from.foreground_count(), 9);
        assert!(from.as_image().pixels().all(|p| p[0] == FOREGROUND));
    }
}
