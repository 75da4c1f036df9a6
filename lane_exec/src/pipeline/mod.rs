//! # Lane pipeline
//!
//! Composes the rectifier, mask extractor, scanner and estimator into a single cyclic module:
//! one frame in, one lane estimate out.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod steer;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, trace};
use serde::{Deserialize, Serialize};
use util::module::State;

use crate::{
    frame::{Frame, InvalidFrameError},
    lane_est::{
        EstimatorState, LaneEstParams, LaneEstParamsError, LaneEstimate, LaneEstimator,
        StatusReport,
    },
    mask::{BinaryMask, MaskExtractor, MaskParams, MaskParamsError},
    rectify::{CalibrationGeometry, Rectifier, RectifyError},
    scan::{ScanParams, ScanParamsError, SliceScanner},
};

pub use steer::SteerDemand;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the whole pipeline, normally loaded from `lane_exec.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneParams {
    /// Width of the camera frames.
    ///
    /// Units: pixels
    pub frame_width: u32,

    /// Height of the camera frames.
    ///
    /// Units: pixels
    pub frame_height: u32,

    /// Bird's-eye calibration. If not given frames are assumed to already be top-down.
    #[serde(default)]
    pub geometry: Option<CalibrationGeometry>,

    #[serde(default)]
    pub mask: MaskParams,

    #[serde(default)]
    pub scan: ScanParams,

    #[serde(default)]
    pub est: LaneEstParams,
}

/// The lane keeping pipeline.
///
/// Must be initialised with `State::init` (or built with `LanePipeline::new`) before use.
#[derive(Debug, Default)]
pub struct LanePipeline {
    stages: Option<Stages>,
}

#[derive(Debug, Clone)]
struct Stages {
    rectifier: Rectifier,
    extractor: MaskExtractor,
    scanner: SliceScanner,
    estimator: LaneEstimator,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum LanePipelineError {
    #[error("Invalid calibration geometry: {0}")]
    RectifyError(RectifyError),

    #[error("Invalid mask parameters: {0}")]
    MaskParamsError(MaskParamsError),

    #[error("Invalid scan parameters: {0}")]
    ScanParamsError(ScanParamsError),

    #[error("Invalid estimator parameters: {0}")]
    EstParamsError(LaneEstParamsError),

    #[error("Frame rejected: {0}")]
    InvalidFrame(InvalidFrameError),

    #[error("The pipeline has not been initialised")]
    NotInitialised,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl State for LanePipeline {
    type InitData = LaneParams;
    type InitError = LanePipelineError;

    type InputData = Frame;
    type OutputData = LaneEstimate;
    type StatusReport = StatusReport;
    type ProcError = LanePipelineError;

    /// Build every stage from the parameters.
    ///
    /// Any estimator memory from a previous initialisation is discarded.
    fn init(&mut self, params: Self::InitData) -> Result<(), Self::InitError> {
        let rectifier = match params.geometry {
            Some(ref g) => Rectifier::new(g, params.frame_width, params.frame_height),
            None => Rectifier::identity(params.frame_width, params.frame_height),
        }
        .map_err(LanePipelineError::RectifyError)?;

        let extractor =
            MaskExtractor::with_frame_size(params.mask, params.frame_width, params.frame_height)
                .map_err(LanePipelineError::MaskParamsError)?;
        let scanner =
            SliceScanner::new(params.scan).map_err(LanePipelineError::ScanParamsError)?;
        let estimator =
            LaneEstimator::new(params.est).map_err(LanePipelineError::EstParamsError)?;

        info!(
            "LanePipeline initialised for {}x{} frames ({})",
            params.frame_width,
            params.frame_height,
            if params.geometry.is_some() { "bird's-eye" } else { "identity" }
        );

        self.stages = Some(Stages {
            rectifier,
            extractor,
            scanner,
            estimator,
        });

        Ok(())
    }

    /// Process one camera frame.
    ///
    /// Frames of the wrong size are rejected before the estimator state is touched.
    fn proc(
        &mut self,
        frame: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let stages = self.stages.as_mut().ok_or(LanePipelineError::NotInitialised)?;

        let rectified = stages
            .rectifier
            .rectify(frame)
            .map_err(LanePipelineError::InvalidFrame)?;

        let mask = stages.extractor.extract(&rectified);
        trace!("LanePipeline mask: {} foreground pixels", mask.foreground_count());

        let scan = stages.scanner.scan(&mask);

        Ok(stages.estimator.estimate(&scan))
    }

    fn reset(&mut self) {
        if let Some(ref mut stages) = self.stages {
            stages.estimator.reset();
        }
    }
}

impl LanePipeline {
    /// Create and initialise a pipeline.
    pub fn new(params: LaneParams) -> Result<Self, LanePipelineError> {
        let mut pipeline = Self::default();
        pipeline.init(params)?;
        Ok(pipeline)
    }

    /// Run only the scanner and estimator on an already extracted mask.
    pub fn proc_mask(
        &mut self,
        mask: &BinaryMask,
    ) -> Result<(LaneEstimate, StatusReport), LanePipelineError> {
        let stages = self.stages.as_mut().ok_or(LanePipelineError::NotInitialised)?;

        let expected = stages.rectifier.frame_dimensions();
        if mask.is_empty() {
            return Err(LanePipelineError::InvalidFrame(InvalidFrameError::Empty));
        }
        if mask.dimensions() != expected {
            return Err(LanePipelineError::InvalidFrame(
                InvalidFrameError::DimensionMismatch {
                    expected,
                    found: mask.dimensions(),
                },
            ));
        }

        let scan = stages.scanner.scan(mask);

        Ok(stages.estimator.estimate(&scan))
    }

    /// The estimator's memory, if initialised.
    pub fn estimator_state(&self) -> Option<&EstimatorState> {
        self.stages.as_ref().map(|s| s.estimator.state())
    }

    /// Frame dimensions the pipeline accepts, if initialised.
    pub fn frame_dimensions(&self) -> Option<(u32, u32)> {
        self.stages.as_ref().map(|s| s.rectifier.frame_dimensions())
    }
}

impl LaneParams {
    /// Parameters with default tuning for frames of the given size and no rectification.
    pub fn with_frame_size(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            geometry: None,
            mask: MaskParams::default(),
            scan: ScanParams::default(),
            est: LaneEstParams::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::GrayImage;

    #[test]
    fn test_uninitialised_pipeline_errors() {
        let mut p = LanePipeline::default();
        assert!(matches!(
            p.proc(&Frame::Luma(GrayImage::new(64, 48))),
            Err(LanePipelineError::NotInitialised)
        ));
        assert!(p.estimator_state().is_none());
    }

    #[test]
    fn test_init_rejects_bad_params() {
        let mut params = LaneParams::with_frame_size(640, 480);
        params.scan.num_slices = 0;
        assert!(matches!(
            LanePipeline::new(params),
            Err(LanePipelineError::ScanParamsError(ScanParamsError::NoSlices))
        ));

        let mut params = LaneParams::with_frame_size(640, 480);
        params.geometry = Some(CalibrationGeometry {
            src_px: [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]],
            dst_px: [[0.0, 0.0], [640.0, 0.0], [640.0, 480.0], [0.0, 480.0]],
        });
        assert!(matches!(
            LanePipeline::new(params),
            Err(LanePipelineError::RectifyError(_))
        ));
    }

    #[test]
    fn test_wrong_size_frame_leaves_state_untouched() {
        let mut p = LanePipeline::new(LaneParams::with_frame_size(64, 48)).unwrap();

        let mut mask = BinaryMask::empty(64, 48);
        for y in 0..48 {
            for x in 10..16 {
                mask.set(x, y, true);
            }
        }
        p.proc_mask(&mask).unwrap();
        let before = p.estimator_state().unwrap().clone();

        assert!(matches!(
            p.proc(&Frame::Luma(GrayImage::new(640, 480))),
            Err(LanePipelineError::InvalidFrame(InvalidFrameError::DimensionMismatch { .. }))
        ));
        assert!(matches!(
            p.proc_mask(&BinaryMask::empty(0, 0)),
            Err(LanePipelineError::InvalidFrame(InvalidFrameError::Empty))
        ));
        assert_eq!(p.estimator_state().unwrap(), &before);
    }

    #[test]
    fn test_params_from_toml() {
        let params: LaneParams = util::params::from_str(
            r#"
            frame_width = 640
            frame_height = 480

            [geometry]
            src_px = [[240.0, 280.0], [400.0, 280.0], [620.0, 470.0], [20.0, 470.0]]
            dst_px = [[160.0, 0.0], [480.0, 0.0], [480.0, 480.0], [160.0, 480.0]]

            [est]
            alpha = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(params.frame_width, 640);
        assert!(params.geometry.is_some());
        assert_eq!(params.est.alpha, 0.5);
        assert_eq!(params.est.max_delta, 0.05);
        assert_eq!(params.scan.num_slices, 7);

        let p = LanePipeline::new(params).unwrap();
        assert_eq!(p.frame_dimensions(), Some((640, 480)));
    }
}
