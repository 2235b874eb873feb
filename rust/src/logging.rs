//! Verbosity-gated logging for the scheduling passes.
//!
//! Output goes to stderr and costs nothing at verbosity 0. Levels:
//! - 0: SILENT
//! - 1: CHANGES (leveling shifts, crash steps, fast-track conversions)
//! - 2: CHECKS (candidates considered and why they were rejected)
//! - 3: DEBUG (forward/backward pass internals)

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1).
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $crate::logging::enabled($verbosity, $crate::logging::VERBOSITY_CHANGES) {
            eprintln!($($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $crate::logging::enabled($verbosity, $crate::logging::VERBOSITY_CHECKS) {
            eprintln!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $crate::logging::enabled($verbosity, $crate::logging::VERBOSITY_DEBUG) {
            eprintln!($($arg)*);
        }
    };
}

/// Whether a message at `level` is emitted under `verbosity`.
#[inline]
pub fn enabled(verbosity: u8, level: u8) -> bool {
    level != VERBOSITY_SILENT && verbosity >= level
}

/// Human-readable name of a verbosity level, used in config reprs.
pub fn verbosity_name(verbosity: u8) -> &'static str {
    match verbosity {
        VERBOSITY_SILENT => "silent",
        VERBOSITY_CHANGES => "changes",
        VERBOSITY_CHECKS => "checks",
        _ => "debug",
    }
}
