//! Ingest wire payload and the validation the ingest endpoint applies.
//!
//! ```json
//! {
//!   "error":   { "message": "...", "type": "...", "stack": "...", "severity": "error" },
//!   "context": { "commit_sha": "<40 hex>", "environment": "production", "occurred_at": "...", ... }
//! }
//! ```

use std::sync::OnceLock;

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::Context;
use crate::event::{CapturedError, Severity};

/// Error section of the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub stack: String,
    pub severity: Severity,
}

/// Body of `POST /api/ingest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub error: ErrorBody,
    pub context: Context,
}

/// Rejections produced by ingest validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("INVALID_PAYLOAD: {field} is required")]
    Missing { field: &'static str },

    #[error("INVALID_PAYLOAD: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl PayloadError {
    /// Error code returned by the ingest endpoint.
    pub fn code(&self) -> &'static str {
        "INVALID_PAYLOAD"
    }

    pub fn field(&self) -> &'static str {
        match self {
            PayloadError::Missing { field } | PayloadError::Invalid { field, .. } => field,
        }
    }
}

fn commit_sha_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-f0-9]{40}$").expect("static regex"))
}

impl Payload {
    /// Assemble a payload. `severity` overrides the error's own severity.
    pub fn new(error: &CapturedError, severity: Option<Severity>, context: Context) -> Self {
        Self {
            error: ErrorBody {
                message: non_empty_or(error.message(), "Unknown error"),
                error_type: non_empty_or(error.error_type(), "Error"),
                stack: non_empty_or(error.stack(), "No stack trace available"),
                severity: severity.unwrap_or(error.severity()),
            },
            context,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Check the payload the way the ingest endpoint does.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.error.message.is_empty() {
            return Err(PayloadError::Missing {
                field: "error.message",
            });
        }
        if self.error.stack.is_empty() {
            return Err(PayloadError::Missing {
                field: "error.stack",
            });
        }

        let commit_sha = self.context.commit_sha().ok_or(PayloadError::Missing {
            field: "context.commit_sha",
        })?;
        if !commit_sha_pattern().is_match(commit_sha) {
            return Err(PayloadError::Invalid {
                field: "context.commit_sha",
                reason: "must be a valid 40-character lowercase hex Git SHA",
            });
        }

        match self.context.environment() {
            Some("production") | Some("preview") => {}
            _ => {
                return Err(PayloadError::Invalid {
                    field: "context.environment",
                    reason: "must be \"production\" or \"preview\"",
                })
            }
        }

        let occurred_at = self.context.occurred_at().ok_or(PayloadError::Missing {
            field: "context.occurred_at",
        })?;
        if DateTime::parse_from_rfc3339(occurred_at).is_err() {
            return Err(PayloadError::Invalid {
                field: "context.occurred_at",
                reason: "must be a valid ISO 8601 timestamp",
            });
        }

        Ok(())
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
