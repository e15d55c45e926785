//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr through `tracing`; user-facing status lines are
//! printed to stdout by the command handlers.

use tracing_subscriber::EnvFilter;

/// Filter used with `--verbose`.
const VERBOSE_FILTER: &str = "cnsh=debug,cnsh_core=debug";

/// Filter used otherwise.
const QUIET_FILTER: &str = "warn";

/// Pick the filter directive. `RUST_LOG` always wins.
pub fn filter_directive(verbose: bool, rust_log: Option<&str>) -> String {
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive.to_string(),
        _ if verbose => VERBOSE_FILTER.to_string(),
        _ => QUIET_FILTER.to_string(),
    }
}

/// Install the global subscriber.
pub fn init_logging(verbose: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(verbose, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(QUIET_FILTER));

    // A subscriber may already be installed when running under tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
