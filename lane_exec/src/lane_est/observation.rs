//! Classification of a slice scan into one of the observation cases

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use util::maths::mean;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// What the scanner saw in one frame, reduced to mean marking positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Observation {
    /// Both markings seen.
    Both { left_x: f64, right_x: f64 },

    /// Only the left marking seen.
    LeftOnly { left_x: f64 },

    /// Only the right marking seen.
    RightOnly { right_x: f64 },

    /// Neither side had enough accepted slices.
    Blind,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Observation {
    /// Classify accepted slice positions.
    ///
    /// A side counts as seen when it has at least `min_samples` accepted slices.
    pub fn classify(left_xs: &[f64], right_xs: &[f64], min_samples: usize) -> Self {
        let side = |xs: &[f64]| {
            if xs.len() >= min_samples {
                mean(xs)
            } else {
                None
            }
        };

        match (side(left_xs), side(right_xs)) {
            (Some(left_x), Some(right_x)) => Observation::Both { left_x, right_x },
            (Some(left_x), None) => Observation::LeftOnly { left_x },
            (None, Some(right_x)) => Observation::RightOnly { right_x },
            (None, None) => Observation::Blind,
        }
    }

    pub fn is_blind(&self) -> bool {
        matches!(self, Observation::Blind)
    }
}
