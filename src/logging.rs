//! Diagnostics go to stderr so `--json` output on stdout stays parseable.

use std::env;
use std::io;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const FILTER_ENV: &str = "CADENCE_LOG";
pub const JSON_ENV: &str = "CADENCE_LOG_JSON";

/// Install the global subscriber. Filter from `CADENCE_LOG` (default `warn`),
/// JSON lines when `CADENCE_LOG_JSON` is truthy.
pub fn init() {
    let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    // An already-installed subscriber wins.
    let _ = if env_bool(JSON_ENV) {
        registry.with(fmt::layer().json().with_writer(io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).try_init()
    };
}

fn env_bool(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
