//! Tracing subscriber setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Verbosity;

/// Filter for the given verbosity
///
/// At normal verbosity `RUST_LOG` wins if set; `-q` and `-v` override it.
#[must_use]
pub fn env_filter(verbosity: Verbosity) -> EnvFilter {
    match verbosity {
        Verbosity::Normal => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive())),
        _ => EnvFilter::new(verbosity.filter_directive()),
    }
}

/// Install the global subscriber, writing to stderr
///
/// A second call is a no-op.
pub fn init(verbosity: Verbosity) {
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(env_filter(verbosity)))
        .try_init();
}
