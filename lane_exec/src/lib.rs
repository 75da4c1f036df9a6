//! # Lane keeping library.
//!
//! Estimates the rover's lateral offset from a painted lane, one camera frame at a time. The
//! stages run in order:
//!
//! ```text
//! raw frame -> rectify -> mask -> scan -> lane_est -> (error, curvature, confidence)
//! ```
//!
//! `pipeline` composes the stages behind the `util::module::State` interface so executables can
//! drive it like any other cyclic module.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Frame container - the owned camera image handed in by the caller
pub mod frame;

/// Perspective rectifier - bird's-eye projection of the raw frame
pub mod rectify;

/// Binary lane mask extractor - isolates the lane markings
pub mod mask;

/// Multi-slice scanner - samples the mask at several rows
pub mod scan;

/// Lane center estimator - turns slice samples into a smooth steering error
pub mod lane_est;

/// Pipeline - composes all stages into a single frame-in/estimate-out module
pub mod pipeline;
