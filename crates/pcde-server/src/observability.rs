//! Log setup for the gateway binary.
//!
//! Tracing starts at [`DEFAULT_LEVEL`] before the config file is read, then
//! [`apply_logging_level`] swaps in `[logging] level` once it is known.
//! The HTTP client stack used by the forward handler and the upstream proxy
//! stays at `warn` whatever level is chosen.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

/// Level used until the configuration has been loaded.
pub const DEFAULT_LEVEL: &str = "info";

/// Outbound client crates that are chatty at debug.
const QUIET_TARGETS: &[&str] = &["hyper_util", "reqwest"];

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level(DEFAULT_LEVEL);
}

pub fn init_tracing_with_level(level: &str) {
    let base_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level))
    } else {
        filter_for(level)
    };

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Switch to `level` after startup. No-op when RUST_LOG is set.
pub fn apply_logging_level(level: &str) {
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| {
            *f = filter_for(level);
        });
    }
}

fn filter_for(level: &str) -> EnvFilter {
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    EnvFilter::new(directives.join(","))
}
