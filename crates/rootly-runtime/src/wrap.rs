//! Function wrappers shared by the global API and [`Runtime`].

use std::error::Error;
use std::fmt::Display;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};

use crate::hooks;
use crate::runtime::{CaptureOutcome, Runtime};

/// Which runtime a wrapper reports to. `Global` is resolved at call time,
/// so wrappers built before `init` start reporting once it runs.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Global,
    Instance(Arc<Runtime>),
}

impl Target {
    fn runtime(&self) -> Option<&Arc<Runtime>> {
        match self {
            Target::Global => hooks::global(),
            Target::Instance(runtime) => Some(runtime),
        }
    }

    pub(crate) fn capture_at<E: Display + ?Sized>(
        &self,
        err: &E,
        location: &Location<'_>,
        extra: Option<&Map<String, Value>>,
    ) -> CaptureOutcome {
        self.runtime().map_or(CaptureOutcome::Disabled, |runtime| {
            runtime.capture_failure_at(err, location, extra)
        })
    }

    /// Like `capture_at`, rendering the source chain into the stack.
    pub(crate) fn capture_error_at<E: Error + ?Sized>(
        &self,
        err: &E,
        location: &Location<'_>,
        extra: Option<&Map<String, Value>>,
    ) -> CaptureOutcome {
        self.runtime().map_or(CaptureOutcome::Disabled, |runtime| {
            runtime.capture_error_at(err, location, extra)
        })
    }
}

/// How a wrapper turns an `Err` into a capture.
type Report<E> = fn(&Target, &E, &'static Location<'static>) -> CaptureOutcome;

fn report_display<E: Display>(
    target: &Target,
    err: &E,
    location: &'static Location<'static>,
) -> CaptureOutcome {
    target.capture_at(err, location, None)
}

fn report_error<E: Error>(
    target: &Target,
    err: &E,
    location: &'static Location<'static>,
) -> CaptureOutcome {
    target.capture_error_at(err, location, None)
}

pub(crate) fn wrap_sync<F, A, T, E>(
    target: Target,
    location: &'static Location<'static>,
    f: F,
) -> impl Fn(A) -> Result<T, E>
where
    F: Fn(A) -> Result<T, E>,
    E: Display,
{
    wrap_sync_with(target, location, report_display::<E>, f)
}

pub(crate) fn wrap_sync_error<F, A, T, E>(
    target: Target,
    location: &'static Location<'static>,
    f: F,
) -> impl Fn(A) -> Result<T, E>
where
    F: Fn(A) -> Result<T, E>,
    E: Error,
{
    wrap_sync_with(target, location, report_error::<E>, f)
}

fn wrap_sync_with<F, A, T, E>(
    target: Target,
    location: &'static Location<'static>,
    report: Report<E>,
    f: F,
) -> impl Fn(A) -> Result<T, E>
where
    F: Fn(A) -> Result<T, E>,
{
    move |arg| {
        let result = f(arg);
        if let Err(err) = &result {
            report(&target, err, location);
        }
        result
    }
}

pub(crate) fn wrap_future<F, A, Fut, T, E>(
    target: Target,
    location: &'static Location<'static>,
    f: F,
) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    wrap_future_with(target, location, report_display::<E>, f)
}

pub(crate) fn wrap_future_error<F, A, Fut, T, E>(
    target: Target,
    location: &'static Location<'static>,
    f: F,
) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Error + Send + 'static,
{
    wrap_future_with(target, location, report_error::<E>, f)
}

fn wrap_future_with<F, A, Fut, T, E>(
    target: Target,
    location: &'static Location<'static>,
    report: Report<E>,
    f: F,
) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    move |arg| {
        let future = f(arg);
        let target = target.clone();
        async move {
            let result = future.await;
            if let Err(err) = &result {
                report(&target, err, location);
            }
            result
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::fakes::RecordingTransport;

    fn instance() -> (Target, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let runtime = Runtime::builder(RuntimeConfig::new("key"))
            .transport(transport.clone())
            .build()
            .unwrap();
        (Target::Instance(Arc::new(runtime)), transport)
    }

    #[test]
    fn ok_passes_through_without_capture() {
        let (target, transport) = instance();
        let double = wrap_sync(target, Location::caller(), |x: i32| Ok::<_, String>(x * 2));
        assert_eq!(double(21), Ok(42));
        assert!(transport.is_empty());
    }

    #[test]
    fn err_is_captured_and_returned() {
        let (target, transport) = instance();
        let parse = wrap_sync(target, Location::caller(), |s: &str| s.parse::<u32>());
        let err = parse("nope").unwrap_err();
        assert_eq!(err.to_string(), "invalid digit found in string");
        assert_eq!(transport.len(), 1);
        assert_eq!(transport.payloads()[0].error.error_type, "ParseIntError");
    }

    #[test]
    fn stack_points_at_wrap_site() {
        let (target, transport) = instance();
        let location = Location::caller();
        let fail = wrap_sync(target, location, |_: ()| Err::<(), _>("bad"));
        let _ = fail(());
        let stack = &transport.payloads()[0].error.stack;
        assert!(stack.contains(&format!("at {location}")), "{stack}");
    }

    #[tokio::test]
    async fn future_err_is_captured_and_propagated() {
        let (target, transport) = instance();
        let fetch = wrap_future(target, Location::caller(), |id: u64| async move {
            Err::<u64, _>(format!("order {id} missing"))
        });
        assert_eq!(fetch(7).await, Err("order 7 missing".to_string()));
        assert_eq!(transport.len(), 1);
        assert_eq!(transport.payloads()[0].error.message, "order 7 missing");
    }

    #[derive(Debug, thiserror::Error)]
    #[error("charge declined")]
    struct ChargeDeclined(#[source] std::num::ParseIntError);

    #[test]
    fn error_wrapper_keeps_source_chain() {
        let (target, transport) = instance();
        let charge = wrap_sync_error(target, Location::caller(), |amount: &str| {
            amount.parse::<u32>().map_err(ChargeDeclined)
        });
        assert!(charge("ten").is_err());

        let stack = &transport.payloads()[0].error.stack;
        let lines: Vec<&str> = stack.lines().collect();
        assert_eq!(lines[0], "ChargeDeclined: charge declined");
        assert!(lines[1].starts_with("    at "));
        assert_eq!(lines[2], "    caused by: invalid digit found in string");
    }

    #[tokio::test]
    async fn async_error_wrapper_keeps_source_chain() {
        let (target, transport) = instance();
        let charge = wrap_future_error(target, Location::caller(), |amount: String| async move {
            amount.parse::<u32>().map_err(ChargeDeclined)
        });
        assert!(charge("ten".to_string()).await.is_err());
        assert!(transport.payloads()[0]
            .error
            .stack
            .ends_with("caused by: invalid digit found in string"));
    }

    #[test]
    fn global_target_is_disabled_without_init() {
        if hooks::is_initialized() {
            return;
        }
        assert_eq!(
            Target::Global.capture_at("x", Location::caller(), None),
            CaptureOutcome::Disabled
        );
    }
}
