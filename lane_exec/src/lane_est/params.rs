//! Parameters for the lane center estimator

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Tuning constants of the lane center estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneEstParams {

    // ---- SMOOTHING ----

    /// Weight of the previous output in the temporal smoothing (alpha). 0 disables smoothing.
    pub alpha: f64,

    /// Maximum change of the output error between two consecutive calls.
    pub max_delta: f64,

    /// Length of the raw error history (N).
    pub history_len: usize,

    // ---- BLIND COASTING ----

    /// Factor applied to the previous error on each blind frame.
    pub blind_decay: f64,

    /// Number of blind frames that coast on the unchanged curvature. 0 decays it from the first
    /// blind frame.
    pub blind_hold_frames: u32,

    /// Factor applied to the remembered curvature after each blind frame past the hold. 1 keeps
    /// the curvature constant for the whole blind run.
    pub blind_curvature_decay: f64,

    // ---- CONFIDENCE ----

    /// Minimum accepted slices for a side to count as observed.
    pub min_samples_per_side: usize,

    /// Number of accepted slices on the best side for full confidence.
    pub full_confidence_samples: usize,

    /// Confidence multiplier when both sides are seen but their separation is implausible.
    pub implausible_penalty: f64,

    /// Confidence multiplier when only one side is seen.
    pub single_side_penalty: f64,

    // ---- LANE WIDTH ----

    /// Lane width assumed until one is learned.
    ///
    /// Units: fraction of frame width
    pub nominal_width_init: f64,

    /// Smallest plausible lane width.
    ///
    /// Units: fraction of frame width
    pub min_width_fraction: f64,

    /// Largest plausible lane width.
    ///
    /// Units: fraction of frame width
    pub max_width_fraction: f64,

    /// Weight of the previous learned width when a new width is measured.
    pub width_ema_keep: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LaneEstParamsError {
    #[error("{0} must be in [0, 1], got {1}")]
    NotAFraction(&'static str, f64),

    #[error("max_delta must be finite and positive, got {0}")]
    InvalidMaxDelta(f64),

    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),

    #[error("Width bounds must satisfy 0 < min < max <= 1, got min = {0}, max = {1}")]
    InvalidWidthBounds(f64, f64),

    #[error("nominal_width_init ({0}) is outside the plausible width bounds")]
    InitialWidthOutOfBounds(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for LaneEstParams {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            max_delta: 0.05,
            history_len: 10,
            blind_decay: 0.9,
            blind_hold_frames: 10,
            blind_curvature_decay: 0.5,
            min_samples_per_side: 2,
            full_confidence_samples: 5,
            implausible_penalty: 0.6,
            single_side_penalty: 0.8,
            nominal_width_init: 0.45,
            min_width_fraction: 0.25,
            max_width_fraction: 0.9,
            width_ema_keep: 0.8,
        }
    }
}

impl LaneEstParams {
    /// Check that the parameters keep the estimator's outputs bounded.
    pub fn validate(&self) -> Result<(), LaneEstParamsError> {
        let fractions = [
            ("alpha", self.alpha),
            ("blind_decay", self.blind_decay),
            ("blind_curvature_decay", self.blind_curvature_decay),
            ("implausible_penalty", self.implausible_penalty),
            ("single_side_penalty", self.single_side_penalty),
            ("width_ema_keep", self.width_ema_keep),
        ];
        for (name, value) in fractions.iter() {
            if !(0.0..=1.0).contains(value) {
                return Err(LaneEstParamsError::NotAFraction(*name, *value));
            }
        }

        if !self.max_delta.is_finite() || self.max_delta <= 0.0 {
            return Err(LaneEstParamsError::InvalidMaxDelta(self.max_delta));
        }

        if self.history_len == 0 {
            return Err(LaneEstParamsError::ZeroCount("history_len"));
        }
        if self.min_samples_per_side == 0 {
            return Err(LaneEstParamsError::ZeroCount("min_samples_per_side"));
        }
        if self.full_confidence_samples == 0 {
            return Err(LaneEstParamsError::ZeroCount("full_confidence_samples"));
        }

        if !(self.min_width_fraction > 0.0
            && self.min_width_fraction < self.max_width_fraction
            && self.max_width_fraction <= 1.0)
        {
            return Err(LaneEstParamsError::InvalidWidthBounds(
                self.min_width_fraction,
                self.max_width_fraction,
            ));
        }
        if !(self.min_width_fraction..=self.max_width_fraction).contains(&self.nominal_width_init) {
            return Err(LaneEstParamsError::InitialWidthOutOfBounds(self.nominal_width_init));
        }

        Ok(())
    }

    /// Whether a measured width, as a fraction of frame width, could be a real lane.
    pub fn is_plausible_width(&self, width_fraction: f64) -> bool {
        (self.min_width_fraction..=self.max_width_fraction).contains(&width_fraction)
    }
}
