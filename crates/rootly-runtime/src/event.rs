//! The error value flowing through the capture pipeline.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Severity reported with a capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown severity: {0} (expected error, warning or info)")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

/// An observed failure, ready to be fingerprinted and shipped.
///
/// `stack` is raw text: a `Type: message` header line followed by frame
/// lines. Errors built by this crate use the capture site as the first
/// frame (`    at src/orders.rs:42:17`) followed by one
/// `    caused by: ...` line per error source.
///
/// Each instance carries a one-shot "captured" marker. The marker belongs
/// to the instance: clones start unmarked, so two distinct errors with the
/// same message are both eligible for capture.
#[derive(Debug)]
pub struct CapturedError {
    message: String,
    error_type: String,
    stack: String,
    severity: Severity,
    captured: AtomicBool,
}

impl Clone for CapturedError {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            error_type: self.error_type.clone(),
            stack: self.stack.clone(),
            severity: self.severity,
            captured: AtomicBool::new(false),
        }
    }
}

impl CapturedError {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.into(),
            stack: stack.into(),
            severity: Severity::default(),
            captured: AtomicBool::new(false),
        }
    }

    /// Build from any displayable error, recording the caller as the top frame.
    #[track_caller]
    pub fn from_display<E: fmt::Display + ?Sized>(err: &E) -> Self {
        Self::from_display_at(err, Location::caller())
    }

    pub fn from_display_at<E: fmt::Display + ?Sized>(
        err: &E,
        location: &Location<'_>,
    ) -> Self {
        let error_type = short_type_name::<E>();
        let message = err.to_string();
        let stack = render_stack(&error_type, &message, location, std::iter::empty());
        Self::new(error_type, message, stack)
    }

    /// Build from a `std::error::Error`, including its source chain.
    #[track_caller]
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::from_error_at(err, Location::caller())
    }

    pub fn from_error_at<E: std::error::Error + ?Sized>(
        err: &E,
        location: &Location<'_>,
    ) -> Self {
        let error_type = short_type_name::<E>();
        let message = err.to_string();

        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        let stack = render_stack(&error_type, &message, location, causes.into_iter());
        Self::new(error_type, message, stack)
    }

    /// Build from a panic payload. Non-string payloads are coerced to a
    /// placeholder message.
    pub fn from_panic(payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> Self {
        let message = panic_message(payload);
        let mut stack = format!("Panic: {message}");
        if let Some(location) = location {
            stack.push_str(&format!("\n    at {location}"));
        }
        Self::new("Panic", message, stack)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Append a forced backtrace after the existing frames.
    pub fn with_backtrace(mut self) -> Self {
        let backtrace = Backtrace::force_capture();
        self.stack.push('\n');
        self.stack.push_str(&backtrace.to_string());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Whether this instance has already entered the pipeline.
    pub fn is_captured(&self) -> bool {
        self.captured.load(Ordering::Acquire)
    }

    /// Set the marker. Returns `true` only for the first call.
    pub(crate) fn mark_captured(&self) -> bool {
        !self.captured.swap(true, Ordering::AcqRel)
    }
}

fn render_stack(
    error_type: &str,
    message: &str,
    location: &Location<'_>,
    causes: impl Iterator<Item = String>,
) -> String {
    let mut stack = format!("{error_type}: {message}\n    at {location}");
    for cause in causes {
        stack.push_str("\n    caused by: ");
        stack.push_str(&cause);
    }
    stack
}

/// `core::num::error::ParseIntError` -> `ParseIntError`,
/// `my_app::Failure<String>` -> `Failure`, `dyn core::error::Error` -> `Error`.
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let full = full.strip_prefix("dyn ").unwrap_or(full);
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base).trim();
    if short.is_empty() {
        "Error".to_string()
    } else {
        short.to_string()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("order {0} not found")]
    struct OrderMissing(u64);

    #[derive(Debug, thiserror::Error)]
    #[error("checkout failed")]
    struct CheckoutFailed(#[source] OrderMissing);

    #[test]
    fn short_type_names() {
        assert_eq!(short_type_name::<std::num::ParseIntError>(), "ParseIntError");
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
        assert_eq!(short_type_name::<dyn std::error::Error>(), "Error");
    }

    #[test]
    fn from_error_renders_header_location_and_causes() {
        let err = CheckoutFailed(OrderMissing(7));
        let captured = CapturedError::from_error(&err);

        assert_eq!(captured.error_type(), "CheckoutFailed");
        assert_eq!(captured.message(), "checkout failed");

        let lines: Vec<&str> = captured.stack().lines().collect();
        assert_eq!(lines[0], "CheckoutFailed: checkout failed");
        assert!(lines[1].starts_with("    at "));
        assert!(lines[1].contains("event.rs"));
        assert_eq!(lines[2], "    caused by: order 7 not found");
    }

    #[test]
    fn from_display_uses_type_name() {
        let captured = CapturedError::from_display("plain message");
        assert_eq!(captured.error_type(), "str");
        assert_eq!(captured.message(), "plain message");
        assert_eq!(captured.severity(), Severity::Error);
    }

    #[test]
    fn panic_payload_coercion() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(boxed.as_ref()), "Box<dyn Any>");
    }

    #[test]
    fn from_panic_without_location() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        let captured = CapturedError::from_panic(boxed.as_ref(), None);
        assert_eq!(captured.error_type(), "Panic");
        assert_eq!(captured.stack(), "Panic: boom");
    }

    #[test]
    fn marker_is_one_shot_and_not_cloned() {
        let captured = CapturedError::new("Error", "x", "Error: x");
        assert!(!captured.is_captured());
        assert!(captured.mark_captured());
        assert!(!captured.mark_captured());
        assert!(captured.is_captured());

        let copy = captured.clone();
        assert!(!copy.is_captured());
    }

    #[test]
    fn severity_parse_and_serde() {
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("INFO".parse::<Severity>().unwrap(), Severity::Info);
        assert!("fatal".parse::<Severity>().is_err());

        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }
}
