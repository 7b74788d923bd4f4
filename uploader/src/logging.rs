//! Log dispatcher for the `courier-upload` binary.
//!
//! The library only talks to the `log` facade; this module installs the
//! `fern` dispatcher writing timestamped lines to stdout.

use chrono::{SecondsFormat, Utc};
use fern::Dispatch;
use log::{Level, LevelFilter, SetLoggerError};
use std::fmt;

/// Renders one log line.
fn render(timestamp: &str, level: Level, target: &str, message: &fmt::Arguments<'_>) -> String {
    format!("[{timestamp}] {level:<5} {target}: {message}")
}

/// Installs the global logger.
///
/// Dependencies log at `warn` at most.
///
/// # Errors
///
/// Returns an error when a logger was already installed.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    let dependencies = level.min(LevelFilter::Warn);
    Dispatch::new()
        .format(|out, message, record| {
            let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            out.finish(format_args!(
                "{}",
                render(&timestamp, record.level(), record.target(), message)
            ));
        })
        .level(dependencies)
        .level_for("courier_uploader", level)
        .level_for("courier_upload", level)
        .level_for("courier_common", level)
        .chain(std::io::stdout())
        .apply()
}
