//! Error types for the capture pipeline.
//!
//! These never cross the public capture boundary: `Runtime::capture` turns
//! them into [`CaptureOutcome::Failed`](crate::CaptureOutcome::Failed).

use std::time::Duration;

use thiserror::Error;

/// Internal faults raised while processing a single capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Clock produced a value chrono cannot represent
    #[error("timestamp out of range: {0} ms")]
    InvalidTimestamp(u64),

    /// Transport rejected the payload before it left the process
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A panic was contained inside the pipeline
    #[error("capture panicked: {0}")]
    Panicked(String),
}

/// Errors produced by the ingest transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Ingest URL could not be formed from the configured base
    #[error("invalid ingest url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// HTTP client construction failed
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Background runtime could not be started
    #[error("failed to start transport runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// Payload could not be serialised
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network-level failure (DNS, connect, reset, TLS)
    #[error("request failed: {0}")]
    Request(String),

    /// No response within the request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Ingest endpoint answered with a non-2xx status
    #[error("ingest endpoint returned HTTP {0}")]
    Status(u16),

    /// Background runtime has already been torn down
    #[error("transport is shut down")]
    ShutDown,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = TransportError::Status(503);
        assert_eq!(err.to_string(), "ingest endpoint returned HTTP 503");

        let err = TransportError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn capture_error_wraps_transport() {
        let err: CaptureError = TransportError::Request("connection refused".into()).into();
        let msg = err.to_string();
        assert!(msg.contains("transport error"));
        assert!(msg.contains("connection refused"));
    }
}
