//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level. Initialisation is
//! idempotent: the host may load the plugin more than once per process.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Returns false if one was already set.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_names(true).with_target(true))
        .try_init()
        .is_ok()
}
