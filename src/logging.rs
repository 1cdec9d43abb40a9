//! Logging initialization.
//!
//! - Human-readable logs by default
//! - JSON structured logs when `[logging] json` is set
//!
//! `RUST_LOG` overrides the configured level. Logs go to stderr so the
//! allocations printed on stdout stay machine-readable.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_LEVEL: &str = "warn";

/// Install the global subscriber. Returns `false` if one was already set,
/// which happens when several CLI runs share a process (tests).
pub fn init_logging(level: &str, json: bool) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.is_ok()
}
