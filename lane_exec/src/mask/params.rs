//! Parameters for the binary lane mask extractor

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the mask extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskParams {
    /// Whether markings are darker or lighter than the floor.
    pub polarity: MarkingPolarity,

    /// Rows above this fraction of the frame height are discarded.
    ///
    /// Units: fraction of frame height, 0 at the top
    pub roi_top_fraction: f64,

    /// Standard deviation of the noise suppression blur. Zero disables the blur.
    ///
    /// Units: pixels
    pub blur_sigma: f32,

    /// Side length of the neighbourhood used for the adaptive threshold. Must be odd and at
    /// least 3.
    ///
    /// Units: pixels
    pub threshold_block_size: u32,

    /// How far a pixel must differ from its local weighted mean to count as a marking.
    ///
    /// Units: intensity levels (0-255)
    pub threshold_bias: f32,

    /// Radius of the closing which bridges gaps in dashed markings. Zero disables it.
    ///
    /// Units: pixels
    pub close_radius: u8,

    /// Radius of the opening which removes speckle. Zero disables it.
    ///
    /// Units: pixels
    pub open_radius: u8,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Marking polarity relative to the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkingPolarity {
    /// e.g. black tape on a light floor
    DarkOnLight,

    /// e.g. white paint on tarmac
    LightOnDark,
}

/// Invalid mask extractor parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaskParamsError {
    #[error("roi_top_fraction must be in [0, 1), got {0}")]
    InvalidRoiFraction(f64),

    #[error("blur_sigma must be finite and non-negative, got {0}")]
    InvalidBlurSigma(f32),

    #[error("threshold_block_size must be odd and at least 3, got {0}")]
    InvalidBlockSize(u32),

    #[error("threshold_bias must be finite and non-negative, got {0}")]
    InvalidBias(f32),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            polarity: MarkingPolarity::DarkOnLight,
            roi_top_fraction: 0.4,
            blur_sigma: 1.5,
            threshold_block_size: 25,
            threshold_bias: 10.0,
            close_radius: 3,
            open_radius: 1,
        }
    }
}

impl MaskParams {
    /// Check that the parameters describe a usable extractor.
    pub fn validate(&self) -> Result<(), MaskParamsError> {
        if !(0.0..1.0).contains(&self.roi_top_fraction) {
            return Err(MaskParamsError::InvalidRoiFraction(self.roi_top_fraction));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(MaskParamsError::InvalidBlurSigma(self.blur_sigma));
        }
        if self.threshold_block_size < 3 || self.threshold_block_size % 2 == 0 {
            return Err(MaskParamsError::InvalidBlockSize(self.threshold_block_size));
        }
        if !self.threshold_bias.is_finite() || self.threshold_bias < 0.0 {
            return Err(MaskParamsError::InvalidBias(self.threshold_bias));
        }

        Ok(())
    }

    /// Sigma of the Gaussian weighting used for the local mean, derived from the block size the
    /// same way common vision libraries derive a Gaussian sigma from a kernel size.
    pub fn threshold_sigma(&self) -> f32 {
        0.3 * ((self.threshold_block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}
