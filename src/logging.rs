//! Logging setup for the `log` facade with an `env_logger` backend.
//!
//! `RUST_LOG` wins when set. Otherwise the level follows the CLI flags:
//! `--quiet` shows errors only, the default is info, `-v` is debug and
//! `-vv` is trace.
//!
//! Debug builds print a timestamp and, when verbose, the module path.
//! Release builds print the level and message only. `--no-color` turns
//! off level styling.
//!
//! ```rust,no_run
//! use dupfinder::logging::init_logging;
//!
//! init_logging(1, false, true);
//! log::debug!("visible with -v");
//! ```

use env_logger::{Builder, WriteStyle};
use log::LevelFilter;
use std::io::Write;

/// Initialize logging from the verbosity flags.
///
/// Calling this more than once is harmless: later calls leave the first
/// logger in place.
pub fn init_logging(verbose: u8, quiet: bool, color: bool) {
    let from_env = std::env::var_os("RUST_LOG").is_some();

    let mut builder = Builder::new();
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }
    configure_format(&mut builder, verbose);
    if !color {
        builder.write_style(WriteStyle::Never);
    }

    if builder.try_init().is_err() {
        return;
    }
    log::debug!(
        "Logging initialized at level {} ({})",
        log::max_level(),
        if from_env { "RUST_LOG" } else { "flags" }
    );
}

/// Map CLI flags to a level filter. `quiet` beats `verbose`.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(debug_assertions)]
fn configure_format(builder: &mut Builder, verbose: u8) {
    builder.format(move |buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        let timestamp = buf.timestamp_seconds();
        if verbose >= 1 {
            writeln!(
                buf,
                "{timestamp} {style}{level:<5}{style:#} [{}] {}",
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        } else {
            writeln!(buf, "{timestamp} {style}{level:<5}{style:#} {}", record.args())
        }
    });
}

#[cfg(not(debug_assertions))]
fn configure_format(builder: &mut Builder, _verbose: u8) {
    builder.format(|buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        writeln!(buf, "{style}{level:<5}{style:#} {}", record.args())
    });
}
