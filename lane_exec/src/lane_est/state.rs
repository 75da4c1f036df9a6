//! Lane center estimator state and per-frame processing

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use log::{debug, info, trace, warn};
use serde::Serialize;
use util::maths::{clamp, ema, lin_map, slew_limit};

use super::{
    LaneEstParams, LaneEstParamsError, LaneEstimate, Observation, Regime, StatusReport,
};
use crate::scan::SliceScan;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The estimator's memory between calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimatorState {
    /// Last output error.
    ///
    /// Range: [-1, 1]
    pub prev_error: f64,

    /// Last curvature estimate.
    pub prev_curvature: f64,

    /// Raw (unsmoothed, unclamped) errors of the most recent sighted frames, oldest first.
    pub history: VecDeque<f64>,

    /// Learned lane width.
    ///
    /// Units: fraction of frame width
    pub nominal_width: f64,

    /// Number of consecutive blind frames.
    pub blind_frames: u32,

    /// Regime of the last call.
    pub last_regime: Option<Regime>,
}

/// Lane center estimator.
///
/// Not internally synchronised, a single instance must only be driven from one thread at a time.
/// Independent instances share nothing.
#[derive(Debug, Clone)]
pub struct LaneEstimator {
    params: LaneEstParams,

    state: EstimatorState,
}

/// Lane centre located in a sighted frame.
#[derive(Debug, Clone, Copy)]
struct Target {
    /// Column of the lane centre.
    x: f64,

    regime: Regime,

    /// Multiplier applied to the baseline confidence.
    confidence_factor: f64,

    /// Measured marking separation, if both sides were seen.
    width_fraction: Option<f64>,

    width_plausible: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl EstimatorState {
    /// Fresh state for the given parameters.
    pub fn new(params: &LaneEstParams) -> Self {
        Self {
            prev_error: 0.0,
            prev_curvature: 0.0,
            history: VecDeque::with_capacity(params.history_len + 1),
            nominal_width: params.nominal_width_init,
            blind_frames: 0,
            last_regime: None,
        }
    }
}

impl LaneEstimator {
    pub fn new(params: LaneEstParams) -> Result<Self, LaneEstParamsError> {
        params.validate()?;

        let state = EstimatorState::new(&params);

        Ok(Self { params, state })
    }

    pub fn params(&self) -> &LaneEstParams {
        &self.params
    }

    /// Read only view of the estimator's memory.
    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    /// Forget everything learned during the session.
    pub fn reset(&mut self) {
        info!("LaneEst reset");
        self.state = EstimatorState::new(&self.params);
    }

    /// Process one slice scan.
    ///
    /// The returned estimate is always within its documented bounds.
    pub fn estimate(&mut self, scan: &SliceScan) -> (LaneEstimate, StatusReport) {
        let left_xs = scan.left_xs();
        let right_xs = scan.right_xs();
        let frame_width = scan.frame_width as f64;

        let observation = if frame_width > 0.0 {
            Observation::classify(&left_xs, &right_xs, self.params.min_samples_per_side)
        } else {
            Observation::Blind
        };

        let (estimate, mut report) = match self.locate_target(observation, frame_width) {
            Some(target) => self.track(target, frame_width, left_xs.len(), right_xs.len()),
            None => self.coast(),
        };
        report.left_samples = left_xs.len();
        report.right_samples = right_xs.len();

        if self.state.last_regime != Some(report.regime) {
            debug!(
                "LaneEst regime {:?} -> {:?}",
                self.state.last_regime, report.regime
            );
        }
        self.state.last_regime = Some(report.regime);

        trace!(
            "LaneEst {:?}: error {:.4}, curvature {:.4}, confidence {:.2}",
            report.regime,
            estimate.error,
            estimate.curvature,
            estimate.confidence
        );

        (estimate, report)
    }

    /// Work out where the lane centre is for a sighted frame, or `None` if the frame is blind.
    fn locate_target(&self, observation: Observation, frame_width: f64) -> Option<Target> {
        let centre_x = frame_width / 2.0;
        let nominal_px = self.state.nominal_width * frame_width;

        let target = match observation {
            Observation::Both { left_x, right_x } => {
                let width_fraction = (right_x - left_x) / frame_width;

                if self.params.is_plausible_width(width_fraction) {
                    Target {
                        x: (left_x + right_x) / 2.0,
                        regime: Regime::Tracking,
                        confidence_factor: 1.0,
                        width_fraction: Some(width_fraction),
                        width_plausible: true,
                    }
                } else {
                    Target {
                        x: centre_x,
                        regime: Regime::Degraded,
                        confidence_factor: self.params.implausible_penalty,
                        width_fraction: Some(width_fraction),
                        width_plausible: false,
                    }
                }
            }
            Observation::LeftOnly { left_x } => Target {
                x: left_x + nominal_px,
                regime: Regime::Degraded,
                confidence_factor: self.params.single_side_penalty,
                width_fraction: None,
                width_plausible: false,
            },
            Observation::RightOnly { right_x } => Target {
                x: right_x - nominal_px,
                regime: Regime::Degraded,
                confidence_factor: self.params.single_side_penalty,
                width_fraction: None,
                width_plausible: false,
            },
            Observation::Blind => return None,
        };

        Some(target)
    }

    /// Handle a frame with at least one side observed.
    fn track(
        &mut self,
        target: Target,
        frame_width: f64,
        num_left: usize,
        num_right: usize,
    ) -> (LaneEstimate, StatusReport) {
        // ---- CONFIDENCE ----

        let best_side = num_left.max(num_right) as f64;
        let baseline = (best_side / self.params.full_confidence_samples as f64).min(1.0);
        let confidence = baseline * target.confidence_factor;

        // ---- LANE WIDTH ----

        // Only plausible two sided geometry may teach the estimator a new width
        if let (true, Some(w)) = (target.width_plausible, target.width_fraction) {
            self.learn_width(w);
        }

        let mut report = StatusReport {
            regime: target.regime,
            width_fraction: target.width_fraction,
            width_updated: target.width_plausible,
            ..Default::default()
        };

        let target_x = target.x;
        report.target_x = Some(target_x);

        // ---- RAW ERROR AND CURVATURE ----

        // Left frame edge is -1, right edge +1. A one sided target may lie outside the frame, only
        // the output is clamped.
        let raw_error = lin_map((0.0, frame_width), (-1.0, 1.0), target_x);
        report.raw_error = Some(raw_error);

        let curvature = match (self.state.history.len() >= 2, self.state.history.back()) {
            (true, Some(last)) => raw_error - last,
            _ => self.state.prev_curvature,
        };

        self.state.history.push_back(raw_error);
        while self.state.history.len() > self.params.history_len {
            self.state.history.pop_front();
        }

        // ---- SMOOTHING AND SLEW LIMIT ----

        let prev = self.state.prev_error;
        let smoothed = ema(prev, raw_error, self.params.alpha);
        let error = clamp(slew_limit(prev, smoothed, self.params.max_delta), -1.0, 1.0);
        report.slew_limited = (smoothed - error).abs() > f64::EPSILON;

        if self.state.blind_frames > 0 {
            info!(
                "LaneEst markings reacquired after {} blind frames",
                self.state.blind_frames
            );
        }

        self.state.prev_error = error;
        self.state.prev_curvature = curvature;
        self.state.blind_frames = 0;

        (
            LaneEstimate {
                error,
                curvature,
                confidence: clamp(confidence, 0.0, 1.0),
            },
            report,
        )
    }

    /// Handle a blind frame by coasting on the previous error and curvature.
    ///
    /// The error decays towards zero but continues along the last known trend, so a short
    /// dropout does not snap the steering back to centre. The trend is held unchanged for the
    /// first `blind_hold_frames` blind frames and only then decays, so long dropouts cannot drift
    /// without bound.
    fn coast(&mut self) -> (LaneEstimate, StatusReport) {
        let prev = self.state.prev_error;
        let curvature = self.state.prev_curvature;

        let coasted = prev * self.params.blind_decay + curvature;
        let error = clamp(slew_limit(prev, coasted, self.params.max_delta), -1.0, 1.0);

        self.state.prev_error = error;
        self.state.blind_frames = self.state.blind_frames.saturating_add(1);
        if self.state.blind_frames >= self.params.blind_hold_frames {
            self.state.prev_curvature = curvature * self.params.blind_curvature_decay;
        }

        if self.state.blind_frames as usize == self.params.history_len {
            warn!(
                "LaneEst has been blind for {} frames, coasting at error {:.3}",
                self.state.blind_frames, error
            );
        }

        let report = StatusReport {
            regime: Regime::Blind,
            slew_limited: (coasted - error).abs() > f64::EPSILON,
            blind_frames: self.state.blind_frames,
            ..Default::default()
        };

        (
            LaneEstimate {
                error,
                curvature,
                confidence: 0.0,
            },
            report,
        )
    }

    /// Blend a plausible measured width into the learned width.
    fn learn_width(&mut self, width_fraction: f64) {
        let learned = ema(self.state.nominal_width, width_fraction, self.params.width_ema_keep);

        self.state.nominal_width = clamp(
            learned,
            self.params.min_width_fraction,
            self.params.max_width_fraction,
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scan::SliceSample;

    const W: u32 = 640;
    const ROWS: [u32; 7] = [432, 377, 329, 288, 251, 219, 192];

    /// Build a scan with `n` slices seeing the given marks.
    fn scan(n: usize, left_x: Option<f64>, right_x: Option<f64>) -> SliceScan {
        SliceScan {
            frame_width: W,
            frame_height: 480,
            samples: ROWS
                .iter()
                .enumerate()
                .map(|(i, &row)| SliceSample {
                    row,
                    left_x: if i < n { left_x } else { None },
                    right_x: if i < n { right_x } else { None },
                })
                .collect(),
        }
    }

    /// A plausible lane of the default width centred on `centre_x`.
    fn lane(centre_x: f64) -> SliceScan {
        scan(5, Some(centre_x - 144.0), Some(centre_x + 144.0))
    }

    fn estimator() -> LaneEstimator {
        LaneEstimator::new(LaneEstParams::default()).unwrap()
    }

    #[test]
    fn test_symmetric_lane_converges_to_zero() {
        let mut est = estimator();

        // Pull the estimate away from zero first
        for _ in 0..10 {
            est.estimate(&lane(388.0));
        }
        let mut last = est.state().prev_error;
        assert!(last > 0.15);

        for _ in 0..25 {
            let (e, r) = est.estimate(&lane(320.0));
            assert_eq!(r.regime, Regime::Tracking);
            assert_eq!(r.raw_error, Some(0.0));
            assert!(e.error.abs() <= last.abs());
            assert_eq!(e.confidence, 1.0);
            last = e.error;
        }
        assert!(last.abs() < 1e-3);
    }

    #[test]
    fn test_single_side_fallback() {
        let mut est = estimator();

        let (e, r) = est.estimate(&scan(5, Some(100.0), None));
        assert_eq!(r.regime, Regime::Degraded);
        assert!((r.target_x.unwrap() - 388.0).abs() < 1e-9);
        assert!((r.raw_error.unwrap() - 0.2125).abs() < 1e-9);
        assert!(!r.width_updated);

        // Two sided with the same slice count has full confidence, one sided is penalised
        let mut two_sided = estimator();
        let (e2, _) = two_sided.estimate(&lane(320.0));
        assert!((e.confidence - 0.8 * e2.confidence).abs() < 1e-12);

        // The output moves towards the raw error at no more than the slew limit
        assert!((e.error - 0.05).abs() < 1e-12);
        assert!(r.slew_limited);

        // Right only mirrors the left only case
        let mut est = estimator();
        let (_, r) = est.estimate(&scan(5, None, Some(540.0)));
        assert!((r.target_x.unwrap() - 252.0).abs() < 1e-9);
        assert!((r.raw_error.unwrap() + 0.2125).abs() < 1e-9);
    }

    #[test]
    fn test_implausible_width_rejected() {
        let mut est = estimator();

        let (e, r) = est.estimate(&scan(5, Some(10.0), Some(630.0)));
        assert_eq!(r.regime, Regime::Degraded);
        assert_eq!(r.target_x, Some(320.0));
        assert_eq!(r.raw_error, Some(0.0));
        assert!(e.error.abs() < 1e-12);
        assert!((e.confidence - 0.6).abs() < 1e-12);
        assert!(!r.width_updated);
        assert_eq!(est.state().nominal_width, 0.45);
    }

    #[test]
    fn test_plausible_width_is_learned() {
        let mut est = estimator();

        // 320 px apart = 0.5 of the frame, blended 0.8/0.2 into 0.45
        let (_, r) = est.estimate(&scan(5, Some(160.0), Some(480.0)));
        assert!(r.width_updated);
        assert_eq!(r.width_fraction, Some(0.5));
        assert!((est.state().nominal_width - 0.46).abs() < 1e-12);

        // The learned width is then used for one sided frames
        let (_, r) = est.estimate(&scan(5, Some(100.0), None));
        assert!((r.target_x.unwrap() - (100.0 + 0.46 * 640.0)).abs() < 1e-9);
    }

    /// Feed a steady rightward trend, returning the last error and curvature.
    fn ramp(est: &mut LaneEstimator) -> (f64, f64) {
        for k in 1..=12 {
            est.estimate(&lane(320.0 + 8.0 * k as f64));
        }
        (est.state().prev_error, est.state().prev_curvature)
    }

    #[test]
    fn test_blind_coasting() {
        let mut est = estimator();

        let (start, trend) = ramp(&mut est);
        assert!(start > 0.2);
        assert!((trend - 0.025).abs() < 1e-9);

        let mut prev = start;
        let mut errors = Vec::new();
        for i in 0..60 {
            let (e, r) = est.estimate(&scan(0, None, None));

            assert_eq!(r.regime, Regime::Blind);
            assert_eq!(r.blind_frames, i + 1);
            assert_eq!(e.confidence, 0.0);
            assert!((e.error - prev).abs() <= 0.05 + 1e-12);
            assert!(e.error > 0.0);

            // The first 10 blind frames coast on the last known trend, later ones halve it
            let expected_curvature = trend * 0.5f64.powi((i as i32 - 9).max(0));
            assert!((e.curvature - expected_curvature).abs() < 1e-12);
            assert!((e.error - (prev * 0.9 + e.curvature)).abs() < 1e-12);

            prev = e.error;
            errors.push(e.error);
        }

        // Sustained loss returns the rover to straight ahead
        assert!(errors[59] < 0.01, "error {} after a long dropout", errors[59]);
        for w in errors[9..].windows(2) {
            assert!(w[1] < w[0]);
        }

        // Blind frames do not touch the history
        assert_eq!(est.state().history.len(), 10);
    }

    #[test]
    fn test_short_dropout_keeps_trend() {
        let mut est = estimator();
        let (start, trend) = ramp(&mut est);

        let mut prev = start;
        for _ in 0..4 {
            let (e, _) = est.estimate(&scan(0, None, None));
            assert_eq!(e.curvature, trend);
            assert!((e.error - (prev * 0.9 + trend)).abs() < 1e-12);
            prev = e.error;
        }
        assert_eq!(est.state().prev_curvature, trend);

        // The error keeps following the trend rather than falling back
        assert!(prev > start);

        // Reacquiring the lane restarts the hold for the next dropout
        est.estimate(&lane(424.0));
        est.estimate(&lane(432.0));
        let trend = est.state().prev_curvature;
        assert!((trend - 0.025).abs() < 1e-9);
        for _ in 0..10 {
            let (e, _) = est.estimate(&scan(0, None, None));
            assert_eq!(e.curvature, trend);
        }
        let (e, _) = est.estimate(&scan(0, None, None));
        assert!((e.curvature - 0.5 * trend).abs() < 1e-12);
    }

    #[test]
    fn test_zero_hold_decays_from_first_blind_frame() {
        let params = LaneEstParams {
            blind_hold_frames: 0,
            ..Default::default()
        };
        let mut est = LaneEstimator::new(params).unwrap();
        let (_, trend) = ramp(&mut est);

        let (e1, _) = est.estimate(&scan(0, None, None));
        let (e2, _) = est.estimate(&scan(0, None, None));
        assert_eq!(e1.curvature, trend);
        assert!((e2.curvature - 0.5 * trend).abs() < 1e-12);
    }

    #[test]
    fn test_raw_error_outside_frame_is_not_clamped() {
        let mut est = estimator();

        // Left marking far right, so the target sits beyond the right edge at 888 px
        let (e, r) = est.estimate(&scan(5, Some(600.0), None));
        assert!((r.raw_error.unwrap() - 1.775).abs() < 1e-12);
        assert!((est.state().history[0] - 1.775).abs() < 1e-12);
        assert!((e.error - 0.05).abs() < 1e-12);

        est.estimate(&scan(5, Some(560.0), None));

        // The trend between off-frame targets is still measured
        let (e, r) = est.estimate(&scan(5, Some(520.0), None));
        assert!((r.raw_error.unwrap() - 1.525).abs() < 1e-12);
        assert!((e.curvature + 0.125).abs() < 1e-12);
        assert!((e.error - 0.15).abs() < 1e-12);
        assert!((-1.0..=1.0).contains(&e.error));
    }

    #[test]
    fn test_one_sample_per_side_is_blind() {
        let mut est = estimator();
        let (e, r) = est.estimate(&scan(1, Some(100.0), Some(540.0)));
        assert_eq!(r.regime, Regime::Blind);
        assert_eq!(e.confidence, 0.0);
        assert!(est.state().history.is_empty());
    }

    #[test]
    fn test_curvature_needs_two_history_entries() {
        let mut est = estimator();

        let (e1, _) = est.estimate(&lane(336.0));
        let (e2, _) = est.estimate(&lane(352.0));
        let (e3, _) = est.estimate(&lane(384.0));

        assert_eq!(e1.curvature, 0.0);
        assert_eq!(e2.curvature, 0.0);
        assert!((e3.curvature - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut est = estimator();
        for k in 0..25 {
            est.estimate(&lane(300.0 + k as f64));
            assert!(est.state().history.len() <= 10);
        }
        assert_eq!(est.state().history.len(), 10);
        assert!((est.state().history[9] - 4.0 / 320.0).abs() < 1e-12);
    }

    #[test]
    fn test_outputs_always_bounded() {
        let mut est = estimator();

        // Deterministic pseudo random scans, including marks well outside the frame
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as f64 / (1u64 << 31) as f64
        };

        let mut prev_error = 0.0;
        for _ in 0..2000 {
            let n = (next() * 8.0) as usize;
            let left = if next() < 0.6 { Some(next() * 900.0 - 130.0) } else { None };
            let right = if next() < 0.6 { Some(next() * 900.0 - 130.0) } else { None };

            let (e, _) = est.estimate(&scan(n.min(7), left, right));

            assert!((-1.0..=1.0).contains(&e.error));
            assert!((0.0..=1.0).contains(&e.confidence));
            assert!((e.error - prev_error).abs() <= 0.05 + 1e-12);
            assert!(est.state().nominal_width >= 0.25 && est.state().nominal_width <= 0.9);
            prev_error = e.error;
        }
    }

    #[test]
    fn test_reset_and_independent_instances() {
        let mut a = estimator();
        let b = estimator();

        for _ in 0..5 {
            a.estimate(&scan(5, Some(160.0), Some(480.0)));
            a.estimate(&scan(5, Some(100.0), None));
        }
        assert_ne!(a.state(), b.state());
        assert_eq!(b.state(), &EstimatorState::new(b.params()));

        a.reset();
        assert_eq!(a.state(), b.state());
    }
}
