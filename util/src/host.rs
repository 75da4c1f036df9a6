//! Host platform utility functions

use std::path::PathBuf;

/// Environment variable pointing at the root of the software checkout.
pub const SW_ROOT_ENV_VAR: &str = "LANE_SW_ROOT";

/// Get the software root directory from the `LANE_SW_ROOT` environment variable.
pub fn get_lane_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
