//! Rootly Runtime
//!
//! In-process error capture for production services. Failures reported by
//! the host (panics, wrapped `Err` results, HTTP 5xx responses) flow through
//! a small pipeline before being shipped to the Rootly ingest endpoint:
//!
//! 1. fingerprint (`message:first-frame`)
//! 2. deduplicate repeats of the same fingerprint within a short window
//! 3. rate-limit total volume regardless of fingerprint
//! 4. attach deployment context (commit SHA, environment, timestamp)
//! 5. POST the JSON payload in the background
//!
//! The pipeline is fail-silent: nothing it does surfaces as a new error or
//! panic in the host. The worst case is "silently did nothing".
//!
//! ```rust,ignore
//! let _guard = rootly_runtime::init(InitOptions::new("rk_live_...").with_environment("production"));
//!
//! let load = rootly_runtime::wrap(|id: u64| load_order(id));
//! load(42)?; // an Err is captured once and returned unchanged
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod dedup;
mod error;
pub mod event;
pub mod fakes;
pub mod hooks;
pub mod metrics;
pub mod middleware;
pub mod payload;
pub mod rate_limit;
pub mod runtime;
pub mod telemetry;
pub mod transport;
mod wrap;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{InitOptions, RuntimeConfig};
pub use context::{build_context, commit_sha, commit_sha_from, Context, Environment};
pub use dedup::{compute_fingerprint, DedupTable};
pub use error::{CaptureError, TransportError};
pub use event::{CapturedError, Severity};
pub use hooks::{
    capture, capture_error, error_handler, flush, init, is_initialized, pending_requests, wrap,
    wrap_async, wrap_error, wrap_error_async, ShutdownGuard,
};
pub use metrics::Metrics;
pub use middleware::{HttpErrorHandler, RequestInfo};
pub use payload::{ErrorBody, Payload, PayloadError};
pub use rate_limit::RateLimiter;
pub use runtime::{CaptureOutcome, Runtime, RuntimeBuilder};
pub use telemetry::init_tracing;
pub use transport::{HttpTransport, Transport};

/// Result type for internal capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Runtime version, reported in the HTTP user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
