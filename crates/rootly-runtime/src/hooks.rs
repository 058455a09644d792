//! Process-wide entry points.
//!
//! [`init`] builds one shared [`Runtime`] and installs a panic hook in front
//! of whatever hook the host already has. Every other function here is a
//! no-op until `init` succeeds, and none of them panic.

use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{InitOptions, RuntimeConfig};
use crate::event::{CapturedError, Severity};
use crate::middleware::HttpErrorHandler;
use crate::runtime::{CaptureOutcome, Runtime};
use crate::wrap::{wrap_future, wrap_future_error, wrap_sync, wrap_sync_error, Target};

static GLOBAL: OnceLock<Arc<Runtime>> = OnceLock::new();

pub(crate) fn global() -> Option<&'static Arc<Runtime>> {
    GLOBAL.get()
}

pub fn is_initialized() -> bool {
    GLOBAL.get().is_some()
}

/// Initialise the process-wide runtime.
///
/// Returns `None` without side effects when already initialised, when the
/// API key is blank, or when the transport cannot be built. Keep the
/// returned guard alive for the life of the process; dropping it drains
/// pending sends for the configured grace period.
///
/// No signal handlers are installed. Hosts that exit on SIGTERM or SIGINT
/// should call [`flush`] from their own handler before exiting, e.g.
///
/// ```no_run
/// use std::time::Duration;
/// use rootly_runtime::InitOptions;
///
/// let _guard = rootly_runtime::init(InitOptions::new("rk_live_..."));
/// // inside the host's SIGTERM handler:
/// rootly_runtime::flush(Duration::from_millis(200));
/// ```
pub fn init(options: InitOptions) -> Option<ShutdownGuard> {
    panic::catch_unwind(AssertUnwindSafe(|| try_init(options)))
        .ok()
        .flatten()
}

fn try_init(options: InitOptions) -> Option<ShutdownGuard> {
    if is_initialized() {
        debug!(event = "init.skipped", reason = "already_initialized");
        return None;
    }
    let Some(config) = RuntimeConfig::from_options(&options) else {
        debug!(event = "init.skipped", reason = "missing_api_key");
        return None;
    };

    let runtime = match Runtime::builder(config).build() {
        Ok(runtime) => Arc::new(runtime),
        Err(err) => {
            debug!(event = "init.failed", error = %err);
            return None;
        }
    };
    if GLOBAL.set(Arc::clone(&runtime)).is_err() {
        return None;
    }
    install_panic_hook();

    debug!(
        event = "init.completed",
        environment = %runtime.config().environment,
        api_url = %runtime.config().api_url,
    );
    Some(ShutdownGuard { runtime })
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if let Some(runtime) = GLOBAL.get() {
            runtime.capture_panic(info.payload(), info.location());
            // The process is about to exit; give the send a chance to land.
            if thread::current().name() == Some("main") {
                runtime.drain();
            }
        }
        previous(info);
    }));
}

/// Drains pending sends when dropped.
#[must_use = "dropping the guard immediately drains and stops waiting for sends"]
#[derive(Debug)]
pub struct ShutdownGuard {
    runtime: Arc<Runtime>,
}

impl ShutdownGuard {
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Wait up to `timeout` for in-flight sends.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.runtime.flush(timeout)
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            self.runtime.drain();
            self.runtime.metrics().flush();
        }));
    }
}

/// Capture an error through the global runtime.
pub fn capture(
    error: &CapturedError,
    extra: Option<&Map<String, Value>>,
    severity: Option<Severity>,
) -> CaptureOutcome {
    match global() {
        Some(runtime) => runtime.capture(error, extra, severity),
        None => CaptureOutcome::Disabled,
    }
}

/// Capture any displayable error, recording the caller's location.
#[track_caller]
pub fn capture_error<E: Display + ?Sized>(
    err: &E,
    extra: Option<&Map<String, Value>>,
) -> CaptureOutcome {
    Target::Global.capture_at(err, Location::caller(), extra)
}

/// Wrap a fallible function; see [`Runtime::wrap`].
#[track_caller]
pub fn wrap<F, A, T, E>(f: F) -> impl Fn(A) -> Result<T, E>
where
    F: Fn(A) -> Result<T, E>,
    E: Display,
{
    wrap_sync(Target::Global, Location::caller(), f)
}

/// Wrap a fallible async function; see [`Runtime::wrap_async`].
#[track_caller]
pub fn wrap_async<F, A, Fut, T, E>(f: F) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    wrap_future(Target::Global, Location::caller(), f)
}

/// Wrap a fallible function whose error's source chain should be reported.
#[track_caller]
pub fn wrap_error<F, A, T, E>(f: F) -> impl Fn(A) -> Result<T, E>
where
    F: Fn(A) -> Result<T, E>,
    E: std::error::Error,
{
    wrap_sync_error(Target::Global, Location::caller(), f)
}

#[track_caller]
pub fn wrap_error_async<F, A, Fut, T, E>(f: F) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + 'static,
{
    wrap_future_error(Target::Global, Location::caller(), f)
}

pub fn error_handler() -> HttpErrorHandler {
    HttpErrorHandler::new(Target::Global)
}

/// Wait up to `timeout` for in-flight sends. Hosts call this from their
/// own signal handling before exiting.
pub fn flush(timeout: Duration) -> bool {
    global().map_or(true, |runtime| runtime.flush(timeout))
}

pub fn pending_requests() -> usize {
    global().map_or(0, |runtime| runtime.pending_requests())
}
