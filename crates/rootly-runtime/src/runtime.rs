//! Capture orchestrator.
//!
//! A [`Runtime`] owns the whole pipeline state: dedup table, rate window,
//! transport and metrics. The process-wide free functions in
//! [`hooks`](crate::hooks) delegate to one shared instance; tests and hosts
//! that want isolation build their own with [`Runtime::builder`].
//!
//! Nothing reachable from a public method here panics or returns an error
//! to the caller. Internal faults become [`CaptureOutcome::Failed`] and are
//! only visible through tracing.

use std::any::Any;
use std::cell::Cell;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::RuntimeConfig;
use crate::context::{build_context_at, commit_sha, normalize_commit_sha};
use crate::dedup::{compute_fingerprint, DedupTable};
use crate::error::{CaptureError, TransportError};
use crate::event::{panic_message, CapturedError, Severity};
use crate::metrics::Metrics;
use crate::middleware::HttpErrorHandler;
use crate::payload::Payload;
use crate::rate_limit::RateLimiter;
use crate::transport::{HttpTransport, Transport};
use crate::wrap::{self, Target};

/// What happened to a single capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Handed to the transport for delivery.
    Sent,
    /// Same fingerprint was sent within the dedup window.
    Deduplicated,
    /// Global rate window is full.
    RateLimited,
    /// Error instance was captured before, or capture re-entered itself.
    AlreadyCaptured,
    /// Runtime is not initialised.
    Disabled,
    /// An internal fault was swallowed.
    Failed,
}

impl CaptureOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, CaptureOutcome::Sent)
    }
}

thread_local! {
    static IN_CAPTURE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the pipeline.
struct ReentrancyGuard;

impl ReentrancyGuard {
    fn enter() -> Option<Self> {
        IN_CAPTURE
            .try_with(|flag| (!flag.replace(true)).then(|| ReentrancyGuard))
            .ok()
            .flatten()
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        let _ = IN_CAPTURE.try_with(|flag| flag.set(false));
    }
}

#[derive(Debug)]
struct PipelineState {
    dedup: DedupTable,
    rate: RateLimiter,
}

/// Error capture pipeline.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    state: Mutex<PipelineState>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

/// Builder for [`Runtime`]. Unset parts default to the HTTP transport, the
/// system clock and fresh metrics.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Arc<Metrics>>,
}

impl RuntimeBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<Runtime, TransportError> {
        let metrics = self.metrics.unwrap_or_default();
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config, Arc::clone(&metrics))?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let state = PipelineState {
            dedup: DedupTable::new(self.config.dedup_window, self.config.max_fingerprints),
            rate: RateLimiter::new(self.config.rate_limit_window, self.config.rate_limit_max),
        };

        Ok(Runtime {
            config: self.config,
            state: Mutex::new(state),
            transport,
            clock,
            metrics,
        })
    }
}

impl Runtime {
    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            transport: None,
            clock: None,
            metrics: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Run one error through the pipeline.
    ///
    /// `severity` overrides the error's own severity on the wire.
    pub fn capture(
        &self,
        error: &CapturedError,
        extra: Option<&Map<String, Value>>,
        severity: Option<Severity>,
    ) -> CaptureOutcome {
        let Some(_guard) = ReentrancyGuard::enter() else {
            return CaptureOutcome::AlreadyCaptured;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| {
            self.try_capture(error, extra, severity)
        })) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                self.log_fault(&err);
                CaptureOutcome::Failed
            }
            Err(payload) => {
                self.log_fault(&CaptureError::Panicked(panic_message(payload.as_ref())));
                CaptureOutcome::Failed
            }
        }
    }

    /// Capture any displayable failure, recording the caller's location.
    #[track_caller]
    pub fn capture_failure<E: Display + ?Sized>(
        &self,
        err: &E,
        extra: Option<&Map<String, Value>>,
    ) -> CaptureOutcome {
        self.capture_failure_at(err, Location::caller(), extra)
    }

    pub(crate) fn capture_failure_at<E: Display + ?Sized>(
        &self,
        err: &E,
        location: &Location<'_>,
        extra: Option<&Map<String, Value>>,
    ) -> CaptureOutcome {
        self.capture_built(|| CapturedError::from_display_at(err, location), extra)
    }

    pub(crate) fn capture_error_at<E: std::error::Error + ?Sized>(
        &self,
        err: &E,
        location: &Location<'_>,
        extra: Option<&Map<String, Value>>,
    ) -> CaptureOutcome {
        self.capture_built(|| CapturedError::from_error_at(err, location), extra)
    }

    fn capture_built<B>(&self, build: B, extra: Option<&Map<String, Value>>) -> CaptureOutcome
    where
        B: FnOnce() -> CapturedError,
    {
        let built = panic::catch_unwind(AssertUnwindSafe(|| {
            let error = build();
            if self.config.attach_backtrace {
                error.with_backtrace()
            } else {
                error
            }
        }));
        match built {
            Ok(error) => self.capture(&error, extra, None),
            Err(payload) => {
                self.log_fault(&CaptureError::Panicked(panic_message(payload.as_ref())));
                CaptureOutcome::Failed
            }
        }
    }

    /// Capture a panic observed by the process hook.
    pub fn capture_panic(
        &self,
        payload: &(dyn Any + Send),
        location: Option<&Location<'_>>,
    ) -> CaptureOutcome {
        let error = CapturedError::from_panic(payload, location);
        let error = if self.config.attach_backtrace {
            error.with_backtrace()
        } else {
            error
        };
        self.capture(&error, None, None)
    }

    /// Wrap a fallible function. An `Err` is captured once and returned unchanged.
    #[track_caller]
    pub fn wrap<F, A, T, E>(self: &Arc<Self>, f: F) -> impl Fn(A) -> Result<T, E>
    where
        F: Fn(A) -> Result<T, E>,
        E: Display,
    {
        wrap::wrap_sync(Target::Instance(Arc::clone(self)), Location::caller(), f)
    }

    /// Wrap a fallible async function. The future's `Err` is captured once
    /// and propagated unchanged.
    #[track_caller]
    pub fn wrap_async<F, A, Fut, T, E>(
        self: &Arc<Self>,
        f: F,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        wrap::wrap_future(Target::Instance(Arc::clone(self)), Location::caller(), f)
    }

    /// Like [`Runtime::wrap`], keeping the error's source chain in the stack.
    #[track_caller]
    pub fn wrap_error<F, A, T, E>(self: &Arc<Self>, f: F) -> impl Fn(A) -> Result<T, E>
    where
        F: Fn(A) -> Result<T, E>,
        E: std::error::Error,
    {
        wrap::wrap_sync_error(Target::Instance(Arc::clone(self)), Location::caller(), f)
    }

    /// Like [`Runtime::wrap_async`], keeping the error's source chain in the stack.
    #[track_caller]
    pub fn wrap_error_async<F, A, Fut, T, E>(
        self: &Arc<Self>,
        f: F,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        wrap::wrap_future_error(Target::Instance(Arc::clone(self)), Location::caller(), f)
    }

    /// HTTP error middleware bound to this runtime.
    pub fn error_handler(self: &Arc<Self>) -> HttpErrorHandler {
        HttpErrorHandler::new(Target::Instance(Arc::clone(self)))
    }

    /// Sends still in flight.
    pub fn pending_requests(&self) -> usize {
        self.transport.pending()
    }

    /// Wait up to `timeout` for in-flight sends.
    pub fn flush(&self, timeout: Duration) -> bool {
        panic::catch_unwind(AssertUnwindSafe(|| self.transport.flush(timeout))).unwrap_or(false)
    }

    /// Best-effort drain used on shutdown paths.
    pub(crate) fn drain(&self) {
        if self.pending_requests() > 0 {
            let drained = self.flush(self.config.shutdown_grace);
            debug!(event = "runtime.drained", drained = drained);
        }
    }

    fn try_capture(
        &self,
        error: &CapturedError,
        extra: Option<&Map<String, Value>>,
        severity: Option<Severity>,
    ) -> crate::Result<CaptureOutcome> {
        if !error.mark_captured() {
            self.log_decision("capture.already_captured", error.message());
            return Ok(CaptureOutcome::AlreadyCaptured);
        }
        self.metrics.inc_captures();

        let fingerprint = compute_fingerprint(error);
        let now_ms = self.clock.now_millis();

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.dedup.should_deduplicate(&fingerprint, now_ms) {
                self.metrics.inc_deduplicated();
                self.log_decision("capture.deduplicated", &fingerprint);
                return Ok(CaptureOutcome::Deduplicated);
            }
            if state.rate.is_rate_limited(now_ms) {
                self.metrics.inc_rate_limited();
                self.log_decision("capture.rate_limited", &fingerprint);
                return Ok(CaptureOutcome::RateLimited);
            }
        }

        let occurred_at = i64::try_from(now_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or(CaptureError::InvalidTimestamp(now_ms))?;
        let sha = match &self.config.commit_sha {
            Some(sha) => normalize_commit_sha(Some(sha.as_str())),
            None => commit_sha(),
        };
        let context = build_context_at(self.config.environment, extra, occurred_at, &sha);
        let payload = Payload::new(error, severity, context);

        self.transport.send(payload)?;
        self.log_decision("capture.sent", &fingerprint);
        Ok(CaptureOutcome::Sent)
    }

    fn log_decision(&self, event: &'static str, fingerprint: &str) {
        let fingerprint = truncate(fingerprint, 50);
        if self.config.debug {
            debug!(event = event, fingerprint = %fingerprint);
        } else {
            trace!(event = event, fingerprint = %fingerprint);
        }
    }

    fn log_fault(&self, err: &CaptureError) {
        if self.config.debug {
            debug!(event = "capture.failed", error = %err);
        } else {
            trace!(event = "capture.failed", error = %err);
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
