//! Logging setup on top of the `log` facade and `env_logger`.
//!
//! The level is taken from, in order:
//!
//! 1. `SNAPLEDGER_LOG` (falling back to `RUST_LOG`), using `env_logger` filter syntax
//! 2. `--quiet` (errors only) or `-v`/`-vv` (debug/trace)
//! 3. Info
//!
//! Log lines go to stderr so JSON on stdout stays machine-readable.
//!
//! ```rust,no_run
//! use snapledger::logging::{init_logging, LogOptions};
//!
//! init_logging(&LogOptions { verbose: 1, quiet: false, no_color: true });
//! log::debug!("visible at -v");
//! ```

use std::env;
use std::io::Write;

use env_logger::{Builder, WriteStyle};
use log::LevelFilter;

/// Environment variable holding a log filter.
pub const LOG_ENV: &str = "SNAPLEDGER_LOG";

/// Flags that shape the logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    /// `-v` count (0 = info, 1 = debug, 2+ = trace)
    pub verbose: u8,
    /// Only errors
    pub quiet: bool,
    /// Never emit ANSI styles
    pub no_color: bool,
}

/// Initialize the global logger. Later calls are ignored.
pub fn init_logging(options: &LogOptions) {
    let mut builder = Builder::new();

    match env_filter() {
        Some(filter) => {
            builder.parse_filters(&filter);
        }
        None => {
            builder.filter_level(determine_level(options.verbose, options.quiet));
        }
    }

    builder.write_style(if options.no_color {
        WriteStyle::Never
    } else {
        WriteStyle::Auto
    });

    configure_format(&mut builder, options.verbose);

    if builder.try_init().is_ok() {
        log::debug!("Logging initialized at level {}", current_level_name());
    }
}

fn env_filter() -> Option<String> {
    [LOG_ENV, "RUST_LOG"]
        .iter()
        .find_map(|name| env::var(name).ok().filter(|v| !v.trim().is_empty()))
}

/// Map CLI flags to a level.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Plain `LEVEL message` at the default level; timestamps and module paths
/// once `-v` is given.
fn configure_format(builder: &mut Builder, verbose: u8) {
    builder.format(move |buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        if verbose == 0 {
            writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
        } else {
            writeln!(
                buf,
                "{} {style}{:<5}{style:#} [{}] {}",
                buf.timestamp_millis(),
                level,
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        }
    });
}

/// Name of the active maximum level.
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
