//! Tracing setup for hosts embedding the crate.
//!
//! Library code never installs a subscriber on its own. Hosts call [`init`]
//! once at startup, or hand a `tracing::Dispatch` to the worker pool.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Environment variable that overrides the default filter.
pub const LOG_ENV: &str = "SITECLIP_LOG";

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installs a global subscriber with an `EnvFilter` (from `SITECLIP_LOG`,
/// else `default_filter`) and a fmt layer, and routes `log` records into it.
///
/// Returns `false` when a subscriber was already installed; the call is
/// then a no-op.
pub fn init(default_filter: &str, json: bool) -> bool {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return false;
    }

    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer));

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::debug!(error = %e, "log records are already routed elsewhere");
    }
    true
}

/// Builds a subscriber for one component without touching global state.
pub fn dispatch(default_filter: &str) -> tracing::Dispatch {
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(default_filter))
        .with(tracing_subscriber::fmt::layer().with_test_writer());
    tracing::Dispatch::new(subscriber)
}
