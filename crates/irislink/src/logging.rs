//! Log output for binaries built on irislink.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by `default`
/// (e.g. `"irislink=info"`) when `RUST_LOG` is unset or invalid.
///
/// Only the first call does anything. If another global subscriber is
/// already installed, that one stays.
pub fn init(default: &str) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        let result = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
        if result.is_err() {
            tracing::debug!("a global subscriber is already installed");
        }
    });
}
