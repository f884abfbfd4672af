//! Tracing setup for the tracker binary and tests.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Tracker-specific filter variable; checked before `RUST_LOG`
pub const LOG_ENV: &str = "TRACKER_LOG";

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Log at INFO unless `TRACKER_LOG` or `RUST_LOG` says otherwise
pub fn init() {
    init_with_level("info")
}

/// Install the global subscriber with `default_level` as the fallback filter
///
/// Output goes to stderr so command output on stdout stays parseable.
/// Calling this again after a subscriber is installed does nothing.
pub fn init_with_level(default_level: &str) {
    let installed = tracing_subscriber::registry()
        .with(filter(default_level))
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
    if installed.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// Debug-level logs captured per test
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
