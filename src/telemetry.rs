//! Structured logging setup.
//!
//! Logs always go to stderr so report text written to stdout stays clean.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output options.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    /// Emit debug-level events from this crate.
    pub verbose: bool,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `options.verbose` when set. Calling this twice is
/// harmless; the second call is ignored.
pub fn init(options: LogOptions) {
    let level = if options.verbose { "debug" } else { "warn" };
    let default_filter = format!("warn,delve_rs={level}");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    if options.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
