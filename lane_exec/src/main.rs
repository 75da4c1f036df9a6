//! # Lane Executable
//!
//! Replays a directory of recorded camera frames through the lane pipeline, archiving the
//! estimate and steering demand for every frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{info, warn};
use serde::Serialize;
use structopt::StructOpt;

use lane_lib::{
    frame::Frame,
    lane_est::{LaneEstimate, Regime, StatusReport},
    pipeline::{LanePipeline, LanePipelineError, LaneParams, SteerDemand},
};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// File extensions which are treated as frames.
const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "lane_exec", about = "Replay recorded frames through the lane pipeline")]
struct Opt {
    /// Parameter file, defaults to `$LANE_SW_ROOT/params/lane_exec.toml`
    #[structopt(long, parse(from_os_str))]
    params: Option<PathBuf>,

    /// Directory to create the session in, defaults to `$LANE_SW_ROOT/sessions`
    #[structopt(long, parse(from_os_str))]
    sessions_dir: Option<PathBuf>,

    /// Proportional steering gain
    #[structopt(long, default_value = "1.0")]
    k_p: f64,

    /// Steering angle limit in radians
    #[structopt(long, default_value = "0.4")]
    max_steer_rad: f64,

    /// Log every frame's estimate
    #[structopt(short, long)]
    verbose: bool,

    /// Directory of frames, processed in file name order
    #[structopt(parse(from_os_str))]
    frames_dir: PathBuf,
}

/// One archived row per processed frame.
#[derive(Debug, Serialize)]
struct FrameRecord<'a> {
    frame_index: usize,
    file: &'a str,
    error: f64,
    curvature: f64,
    confidence: f64,
    regime: Regime,
    left_samples: usize,
    right_samples: usize,
    raw_error: Option<f64>,
    width_fraction: Option<f64>,
    slew_limited: bool,
    steer_rad: f64,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = match opt.sessions_dir {
        Some(ref dir) => Session::new_in("lane_exec", dir),
        None => Session::new("lane_exec", "sessions"),
    }
    .wrap_err("Failed to create the session")?;

    // Initialise logger
    let level = if opt.verbose {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    };
    logger_init(level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Lane Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: LaneParams = match opt.params {
        Some(ref path) => util::params::load_from_path::<LaneParams, _>(path),
        None => util::params::load::<LaneParams>("lane_exec.toml"),
    }
    .wrap_err("Could not load lane_exec params")?;

    info!("Parameters loaded");

    // ---- INIT PIPELINE ----

    let mut pipeline =
        LanePipeline::new(params).wrap_err("Failed to initialise the LanePipeline")?;

    let mut archiver = Archiver::from_path(&session, "lane_est/estimates.csv")
        .wrap_err("Failed to initialise the estimate archive")?;

    let frame_paths = list_frames(&opt.frames_dir)?;

    info!(
        "Replaying {} frames from {:?}\n",
        frame_paths.len(),
        opt.frames_dir
    );

    // ---- MAIN LOOP ----

    let mut num_processed = 0usize;
    let mut num_rejected = 0usize;
    let mut num_blind = 0usize;

    for (frame_index, path) in frame_paths.iter().enumerate() {
        let file = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or_default();

        let image = match image::open(path) {
            Ok(i) => i,
            Err(e) => {
                warn!("Could not open frame {:?}: {}", path, e);
                num_rejected += 1;
                continue;
            }
        };

        let (estimate, report) = match pipeline.proc(&Frame::from_dynamic(image)) {
            Ok(r) => r,
            Err(LanePipelineError::InvalidFrame(e)) => {
                warn!("Frame {} ({}) rejected: {}", frame_index, file, e);
                num_rejected += 1;
                continue;
            }
            Err(e) => return Err(e).wrap_err("Lane pipeline failed"),
        };

        num_processed += 1;
        if report.regime == Regime::Blind {
            num_blind += 1;
        }

        let demand = SteerDemand::from_estimate(&estimate, opt.k_p, opt.max_steer_rad);

        archiver
            .serialise(record(frame_index, file, &estimate, &report, &demand))
            .wrap_err("Failed to archive the lane estimate")?;
    }

    // ---- SUMMARY ----

    info!(
        "Replay complete: {} processed, {} rejected, {} blind",
        num_processed, num_rejected, num_blind
    );

    if let Some(state) = pipeline.estimator_state() {
        session
            .save_json("lane_est/final_state.json", state)
            .wrap_err("Failed to save the final estimator state")?;
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// List every frame file in the directory, sorted by file name.
fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .wrap_err_with(|| format!("Could not read the frames directory {:?}", dir))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.wrap_err("Could not read a frames directory entry")?.path();

        let is_frame = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| FRAME_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);

        if path.is_file() && is_frame {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(eyre!("No frames found in {:?}", dir));
    }

    paths.sort();

    Ok(paths)
}

fn record<'a>(
    frame_index: usize,
    file: &'a str,
    estimate: &LaneEstimate,
    report: &StatusReport,
    demand: &SteerDemand,
) -> FrameRecord<'a> {
    FrameRecord {
        frame_index,
        file,
        error: estimate.error,
        curvature: estimate.curvature,
        confidence: estimate.confidence,
        regime: report.regime,
        left_samples: report.left_samples,
        right_samples: report.right_samples,
        raw_error: report.raw_error,
        width_fraction: report.width_fraction,
        slew_limited: report.slew_limited,
        steer_rad: demand.steer_rad,
    }
}
