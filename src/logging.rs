//! Tracing setup for binaries, demos and tests.
//!
//! The library only emits `tracing` events. Hosts that do not install a
//! subscriber of their own can call [`init_tracing`].

use std::sync::OnceLock;
use tracing_subscriber::{fmt, EnvFilter};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

const DEFAULT_FILTER: &str = "info";

/// Install a `fmt` subscriber filtered by `MACHINA_LOG`, then `RUST_LOG`,
/// then `info`. Safe to call more than once; an already installed global
/// subscriber is left in place.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let filter = filter_directives();
        let result = fmt()
            .with_env_filter(EnvFilter::new(&filter))
            .with_target(true)
            .try_init();

        if result.is_err() {
            tracing::debug!("global tracing subscriber already set, keeping it");
            return;
        }
        tracing::debug!(filter = %filter, "tracing initialized");
    });
}

fn filter_directives() -> String {
    std::env::var("MACHINA_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing();
        init_tracing();
        assert!(TRACING_INITIALIZED.get().is_some());
    }
}
