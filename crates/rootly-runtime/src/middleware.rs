//! Error middleware for HTTP frameworks.
//!
//! Framework-agnostic: the host passes the failed request's method, path
//! and chosen response status, plus a `next` continuation that renders the
//! error. Only server errors (status >= 500) are captured, and `next` is
//! always called with the original error.
//!
//! ```rust,ignore
//! let handler = rootly_runtime::error_handler();
//! let response = handler.handle(err, &RequestInfo::new("POST", "/orders"), 500, render_error);
//! ```

use std::fmt::Display;
use std::panic::Location;

use serde_json::{Map, Value};

use crate::runtime::CaptureOutcome;
use crate::wrap::Target;

/// Request attributes attached to captured server errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpErrorHandler {
    target: Target,
}

impl HttpErrorHandler {
    pub(crate) fn new(target: Target) -> Self {
        Self { target }
    }

    /// Capture `err` if `status >= 500`, then hand it to `next`.
    #[track_caller]
    pub fn handle<E, R, N>(&self, err: E, request: &RequestInfo, status: u16, next: N) -> R
    where
        E: Display,
        N: FnOnce(E) -> R,
    {
        self.observe(&err, request, status, Location::caller());
        next(err)
    }

    /// Like [`HttpErrorHandler::handle`], reporting the error's source chain.
    #[track_caller]
    pub fn handle_error<E, R, N>(&self, err: E, request: &RequestInfo, status: u16, next: N) -> R
    where
        E: std::error::Error,
        N: FnOnce(E) -> R,
    {
        if is_server_error(status) {
            let extra = request_context(request, status);
            self.target.capture_error_at(&err, Location::caller(), Some(&extra));
        }
        next(err)
    }

    fn observe<E: Display>(
        &self,
        err: &E,
        request: &RequestInfo,
        status: u16,
        location: &Location<'_>,
    ) -> Option<CaptureOutcome> {
        is_server_error(status).then(|| {
            self.target
                .capture_at(err, location, Some(&request_context(request, status)))
        })
    }
}

fn is_server_error(status: u16) -> bool {
    status >= 500
}

fn request_context(request: &RequestInfo, status: u16) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("source".into(), Value::from("http"));
    extra.insert("method".into(), Value::from(request.method.as_str()));
    extra.insert("path".into(), Value::from(request.path.as_str()));
    extra.insert("status_code".into(), Value::from(status));
    extra
}
