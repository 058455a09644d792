//! Tracing subscriber setup for binaries embedding the runtime.
//!
//! The library never installs a subscriber itself; it only emits events.
//! Hosts that have no subscriber of their own can call [`init_tracing`].

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "ROOTLY_LOG";

/// Initialise the global tracing subscriber.
///
/// Filter resolution: `ROOTLY_LOG`, then `RUST_LOG`, then `level`.
/// With `json`, lines are newline-delimited JSON.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
