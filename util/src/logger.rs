//! Logger setup shared by the executables
//!
//! Every line is prefixed with the seconds elapsed since the session started and a three letter
//! level tag. The terminal gets coloured tags, the session log file gets plain ones.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level, Record};
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The minimum log level must be INFO or more verbose, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Could not open the session log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("A logger has already been set: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Start logging to stdout and to the session's log file.
///
/// `min_level` must be `Info` or more verbose. Per-frame lane estimates are only logged at
/// `Trace`.
///
/// Only the first call in a process can succeed.
pub fn logger_init(
    min_level: LevelFilter,
    session: &Session
) -> Result<(), LoggerInitError> {
    if min_level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    let terminal = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{:10.6} {}] {}{}",
                session::get_elapsed_seconds(),
                coloured_tag(record.level()),
                target_prefix(record),
                message
            ))
        })
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{:10.6} {}] {}{}",
                session::get_elapsed_seconds(),
                tag(record.level()),
                target_prefix(record),
                message
            ))
        })
        .chain(log_file);

    fern::Dispatch::new()
        .level(min_level)
        .chain(terminal)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised at {:?}", min_level);
    if let Ok(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log file: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn tag(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info  => "INF",
        Level::Warn  => "WRN",
        Level::Error => "ERR"
    }
}

fn coloured_tag(level: Level) -> ColoredString {
    let t = tag(level);

    match level {
        Level::Trace => t.dimmed().italic(),
        Level::Debug => t.dimmed(),
        Level::Info  => t.normal(),
        Level::Warn  => t.yellow(),
        Level::Error => t.red().bold()
    }
}

/// Debug and trace lines name the module they came from.
fn target_prefix(record: &Record) -> String {
    if record.level() > Level::Info {
        format!("{}: ", record.target())
    }
    else {
        String::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(tag(Level::Trace), "TRC");
        assert_eq!(tag(Level::Warn), "WRN");
        assert!(coloured_tag(Level::Error).to_string().contains("ERR"));
    }

    #[test]
    fn test_target_only_for_verbose_levels() {
        let debug = Record::builder()
            .level(Level::Debug)
            .target("lane_lib::lane_est")
            .build();
        assert_eq!(target_prefix(&debug), "lane_lib::lane_est: ");

        let info = Record::builder()
            .level(Level::Info)
            .target("lane_lib::lane_est")
            .build();
        assert_eq!(target_prefix(&info), "");
    }
}
