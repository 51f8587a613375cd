//! Logging setup for the pushgate binaries
//!
//! Two kinds of output share one subscriber: diagnostics, and the
//! per-attempt delivery lines emitted under the `pushgate::access`
//! target. The access log is the delivery audit trail, so it stays
//! visible at info even when the diagnostic level is quieter; an
//! explicit `RUST_LOG` overrides everything, including that.

use tracing_subscriber::EnvFilter;

/// Target used by the delivery access log
pub const ACCESS_TARGET: &str = "pushgate::access";

/// Initialize the process subscriber from the configured log section.
/// `format` is `"json"` for machine-readable output, anything else for
/// console output.
pub fn init(service_name: &str, level: &str, format: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    if format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_current_span(false)
            .with_span_list(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    tracing::info!(service = service_name, level, format, "Logging initialized");
}

/// Build the filter for a configured diagnostic level. Failed-delivery
/// lines are error-level and always pass; the directive pins the rest
/// of the access log at info so a `level = "warn"` deployment still
/// records every accepted and succeeded push.
fn filter_directives(level: &str) -> String {
    format!("{level},{ACCESS_TARGET}=info")
}
