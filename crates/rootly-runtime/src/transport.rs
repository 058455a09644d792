//! Fire-and-forget delivery to the ingest endpoint.
//!
//! [`HttpTransport`] owns a single-worker Tokio runtime, so sends work from
//! any thread, whether or not the host runs its own async runtime. Every
//! send is tracked by a [`TaskTracker`] from spawn until it settles
//! (2xx, error, or timeout); [`Transport::flush`] waits for the tracker to
//! empty, up to a deadline. Flushes may overlap.
//!
//! There are no retries. Delivery failures are counted and logged at
//! `debug`, never reported to the caller.

use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Url};
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::error::TransportError;
use crate::metrics::Metrics;
use crate::payload::Payload;

/// Path appended to the configured base URL.
pub const INGEST_PATH: &str = "/api/ingest";

/// Per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const FLUSH_SLACK: Duration = Duration::from_millis(50);

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Outbound delivery seam.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Queue a payload for delivery.
    ///
    /// Only failures that happen before the payload leaves the caller
    /// (serialisation, transport shut down) are returned.
    fn send(&self, payload: Payload) -> Result<(), TransportError>;

    /// Sends currently in flight.
    fn pending(&self) -> usize;

    /// Wait up to `timeout` for in-flight sends. Returns `true` if all settled.
    ///
    /// Blocks the calling thread.
    fn flush(&self, timeout: Duration) -> bool;
}

/// JSON-over-HTTP(S) transport. TLS is selected by the URL scheme.
pub struct HttpTransport {
    client: reqwest::Client,
    ingest_url: Url,
    api_key: String,
    timeout: Duration,
    tracker: TaskTracker,
    runtime: Option<tokio::runtime::Runtime>,
    metrics: Arc<Metrics>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("ingest_url", &self.ingest_url.as_str())
            .field("timeout", &self.timeout)
            .field("pending", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(config: &RuntimeConfig, metrics: Arc<Metrics>) -> Result<Self, TransportError> {
        let raw = config.ingest_url();
        let ingest_url = Url::parse(&raw).map_err(|e| TransportError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(ingest_url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl {
                url: raw,
                reason: format!("unsupported scheme {}", ingest_url.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .user_agent(format!("rootly-runtime/{}", crate::VERSION))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("rootly-transport")
            .enable_all()
            .build()?;

        Ok(Self {
            client,
            ingest_url,
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
            tracker: TaskTracker::new(),
            runtime: Some(runtime),
            metrics,
        })
    }

    pub fn ingest_url(&self) -> &str {
        self.ingest_url.as_str()
    }

    fn handle(&self) -> Result<&Handle, TransportError> {
        self.runtime
            .as_ref()
            .map(|rt| rt.handle())
            .ok_or(TransportError::ShutDown)
    }
}

impl Transport for HttpTransport {
    fn send(&self, payload: Payload) -> Result<(), TransportError> {
        let body = payload.to_json()?;
        let handle = self.handle()?;

        let request = self
            .client
            .post(self.ingest_url.clone())
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let metrics = Arc::clone(&self.metrics);
        let timeout = self.timeout;

        self.tracker.spawn_on(
            async move {
                match deliver(request, timeout).await {
                    Ok(status) => {
                        metrics.inc_sent();
                        debug!(event = "transport.sent", status = status);
                    }
                    Err(err) => {
                        metrics.inc_send_failed();
                        debug!(event = "transport.failed", error = %err);
                    }
                }
            },
            handle,
        );
        Ok(())
    }

    fn pending(&self) -> usize {
        self.tracker.len()
    }

    fn flush(&self, timeout: Duration) -> bool {
        if self.tracker.is_empty() {
            return true;
        }
        let Ok(handle) = self.handle() else {
            return false;
        };

        // Never close the tracker here; other flushes may be waiting on it.
        let tracker = self.tracker.clone();
        let (tx, rx) = mpsc::channel();
        handle.spawn(async move {
            let drained = tokio::time::timeout(timeout, async {
                while !tracker.is_empty() {
                    tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
                }
            })
            .await
            .is_ok();
            let _ = tx.send(drained);
        });

        rx.recv_timeout(timeout.saturating_add(FLUSH_SLACK))
            .unwrap_or(false)
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        // May run inside a host async context; must not block.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn deliver(request: RequestBuilder, timeout: Duration) -> Result<u16, TransportError> {
    let response = request.send().await.map_err(|e| classify(e, timeout))?;
    let status = response.status();
    // Body is ignored but drained so the connection can be pooled.
    let _ = response.bytes().await;

    if status.is_success() {
        Ok(status.as_u16())
    } else {
        Err(TransportError::Status(status.as_u16()))
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        let config = RuntimeConfig::new("key").with_api_url("ftp://example.com");
        let err = HttpTransport::new(&config, Arc::new(Metrics::new())).unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
    }

    #[test]
    fn rejects_unparseable_url() {
        let config = RuntimeConfig::new("key").with_api_url("not a url");
        let err = HttpTransport::new(&config, Arc::new(Metrics::new())).unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
    }

    #[test]
    fn builds_ingest_url() {
        let config = RuntimeConfig::new("key").with_api_url("http://127.0.0.1:9/");
        let transport = HttpTransport::new(&config, Arc::new(Metrics::new())).unwrap();
        assert_eq!(transport.ingest_url(), "http://127.0.0.1:9/api/ingest");
        assert_eq!(transport.pending(), 0);
        assert!(transport.flush(Duration::from_millis(10)));
    }
}
