//! Tracing bootstrap for hosts and tests

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"info"` or `"insureflow_engine=debug"`).
///
/// Returns `false` when a global subscriber was already installed, so
/// calling it more than once is harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
