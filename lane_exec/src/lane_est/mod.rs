//! # Lane center estimator
//!
//! The stateful core of the lane keeping system. Each call fuses one slice scan into a single
//! steering error, a curvature estimate and a confidence score. Between calls the estimator keeps
//! a small memory (previous output, a short error history and the learned lane width) which lets
//! it smooth the output and coast through frames where no markings are visible.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod observation;
mod params;
mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

pub use observation::*;
pub use params::*;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The estimator output consumed by the steering controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LaneEstimate {
    /// Normalised lateral offset of the lane centre, negative when the lane is to the left of the
    /// rover.
    ///
    /// Range: [-1, 1]
    pub error: f64,

    /// Rate of change of the error per frame.
    pub curvature: f64,

    /// How much the error can be trusted, 0 on blind frames.
    ///
    /// Range: [0, 1]
    pub confidence: f64,
}

/// Per call diagnostics from the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusReport {
    /// Which regime the estimator was in for this call.
    pub regime: Regime,

    /// Number of accepted left side slices.
    pub left_samples: usize,

    /// Number of accepted right side slices.
    pub right_samples: usize,

    /// Lane centre target column, not set on blind frames.
    pub target_x: Option<f64>,

    /// Error before smoothing, slew limiting and clamping, not set on blind frames.
    ///
    /// Beyond [-1, 1] when a one sided target lies outside the frame.
    pub raw_error: Option<f64>,

    /// Measured marking separation as a fraction of frame width, when both sides were seen.
    pub width_fraction: Option<f64>,

    /// True if the learned lane width was updated.
    pub width_updated: bool,

    /// True if the slew rate limit clipped the output.
    pub slew_limited: bool,

    /// Number of consecutive blind frames, including this one.
    pub blind_frames: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The observable operating regimes of the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Regime {
    /// Both markings visible with a plausible separation.
    Tracking,

    /// Only one marking visible, or the separation was implausible.
    Degraded,

    /// No usable markings, the estimate is coasting on memory.
    Blind,
}

impl Default for StatusReport {
    fn default() -> Self {
        Self {
            regime: Regime::Blind,
            left_samples: 0,
            right_samples: 0,
            target_x: None,
            raw_error: None,
            width_fraction: None,
            width_updated: false,
            slew_limited: false,
            blind_frames: 0,
        }
    }
}
