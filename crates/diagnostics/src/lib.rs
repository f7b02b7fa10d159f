//! Logging for the ERDDAP aggregation workspace.
//!
//! Every crate logs through the `info!`, `debug!`, `warn!` and `error!`
//! macros re-exported here; they forward to `emit` with structured
//! template properties. Output goes to stderr through `emit_term`.
//!
//! The level is read once from `ERDDAP_AGG_LOG`:
//! - `off` (default) - nothing is emitted
//! - `error`, `warn`, `info`, `debug` - minimum level to emit

use std::sync::Once;

// Re-export emit so the macros resolve from any crate
pub use emit;

/// Environment variable holding the log level.
pub const LOG_ENV: &str = "ERDDAP_AGG_LOG";

static INIT: Once = Once::new();

/// The verbosity requested through [`LOG_ENV`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Off,
    AtLeast(emit::Level),
}

/// Parse a level name. Returns `None` for names that are not recognized.
pub fn parse_verbosity(value: &str) -> Option<Verbosity> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "off" | "none" => Some(Verbosity::Off),
        "error" => Some(Verbosity::AtLeast(emit::Level::Error)),
        "warn" | "warning" => Some(Verbosity::AtLeast(emit::Level::Warn)),
        "info" => Some(Verbosity::AtLeast(emit::Level::Info)),
        "debug" | "trace" => Some(Verbosity::AtLeast(emit::Level::Debug)),
        _ => None,
    }
}

/// Initialize logging from the environment.
///
/// Call once at startup; later calls are ignored.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let requested = std::env::var(LOG_ENV).unwrap_or_default();

        let level = match parse_verbosity(&requested) {
            Some(Verbosity::Off) => return,
            Some(Verbosity::AtLeast(level)) => level,
            None => {
                // Bootstrap warning, the emitter is not running yet
                eprintln!("Warning: unknown {LOG_ENV} value '{requested}', using 'info'");
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime lives for the rest of the process
        std::mem::forget(rt);
    });
}

// The level macros are re-exported directly rather than wrapped in
// `macro_rules!`: emit's template holes (`{rows}`) are resolved at the
// macro call site, and a wrapper would hide the caller's locals behind
// macro hygiene.
//
// - `info!`: operations a user wants to see: windows fetched, rows committed, files written.
// - `debug!`: internal detail: URLs, batch flushes, probe results, generated SQL.
// - `warn!`: recoverable trouble: a failed window, a skipped row, a fallback.
// - `error!`: failures that abort a run.
pub use emit::{debug, error, info, warn};

pub use init_diagnostics as init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_safe_to_call_multiple_times() {
        init_diagnostics();
        init_diagnostics();
    }

    #[test]
    fn test_parse_verbosity() {
        assert_eq!(parse_verbosity("off"), Some(Verbosity::Off));
        assert_eq!(parse_verbosity(""), Some(Verbosity::Off));
        assert_eq!(
            parse_verbosity("DEBUG"),
            Some(Verbosity::AtLeast(emit::Level::Debug))
        );
        assert_eq!(
            parse_verbosity(" warn "),
            Some(Verbosity::AtLeast(emit::Level::Warn))
        );
        assert_eq!(parse_verbosity("loud"), None);
    }

    #[test]
    fn test_macros_compile() {
        let rows = 42;
        info!("Committed {rows} rows");
        debug!("Flushed batch of {size} rows", size: 1000);
        warn!("Window failed");
        error!("Store unavailable");
    }
}
