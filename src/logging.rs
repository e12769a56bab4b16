//! Diagnostic logging through `tracing`.
//!
//! Diagnostics go to stderr so that `--json` output on stdout stays
//! machine-readable. They are separate from the audit log, which records
//! mutations for the user rather than for debugging.

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable that overrides every other level setting.
pub const LOG_ENV: &str = "GITID_LOG";

/// Filter directive for a configured level raised by `-v` flags.
///
/// Each `-v` moves one step up from the configured base:
/// warn → info → debug → trace.
pub fn filter_directive(base: &str, verbosity: u8) -> String {
    const STEPS: [&str; 4] = ["warn", "info", "debug", "trace"];
    if verbosity == 0 {
        return base.to_string();
    }
    let start = STEPS
        .iter()
        .position(|s| s.eq_ignore_ascii_case(base))
        .unwrap_or(0);
    let level = STEPS[(start + verbosity as usize).min(STEPS.len() - 1)];
    format!("gitid={}", level)
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(base_level: &str, verbosity: u8) {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::new(directive),
        _ => EnvFilter::new(filter_directive(base_level, verbosity)),
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init();
}
