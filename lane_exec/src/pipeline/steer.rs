//! Steering demand derived from a lane estimate

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use util::maths::clamp;

use crate::lane_est::LaneEstimate;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Proportional steering demand for the external steering controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SteerDemand {
    /// Steer angle demand, positive towards the right.
    ///
    /// Units: radians
    pub steer_rad: f64,

    /// Confidence of the estimate the demand was built from, so the consumer can slow down or
    /// hold course when it drops.
    pub confidence: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SteerDemand {
    /// `k_p * error * max_steer_rad`, limited to `+/- max_steer_rad`.
    ///
    /// Any deadzone is left to the steering controller.
    pub fn from_estimate(estimate: &LaneEstimate, k_p: f64, max_steer_rad: f64) -> Self {
        let limit = max_steer_rad.abs();

        Self {
            steer_rad: clamp(k_p * estimate.error * limit, -limit, limit),
            confidence: estimate.confidence,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_estimate() {
        let est = LaneEstimate { error: 0.5, curvature: 0.0, confidence: 0.8 };

        let d = SteerDemand::from_estimate(&est, 1.0, 0.4);
        assert!((d.steer_rad - 0.2).abs() < 1e-12);
        assert_eq!(d.confidence, 0.8);

        // High gains saturate at the steering limit
        let d = SteerDemand::from_estimate(&est, 10.0, 0.4);
        assert_eq!(d.steer_rad, 0.4);

        let est = LaneEstimate { error: -1.0, ..est };
        let d = SteerDemand::from_estimate(&est, 3.0, -0.4);
        assert_eq!(d.steer_rad, -0.4);
    }
}
