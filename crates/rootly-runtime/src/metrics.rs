//! Atomic counters describing what the capture pipeline did.
//!
//! Each [`Runtime`](crate::Runtime) owns one instance, shared with its
//! transport. Counters are bumped silently; call [`Metrics::flush`] to emit
//! the current values as a single `tracing::info!` event (e.g. at shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline counters. Lock-free.
#[derive(Debug)]
pub struct Metrics {
    captures: AtomicU64,
    deduplicated: AtomicU64,
    rate_limited: AtomicU64,
    sent: AtomicU64,
    send_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            captures: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            send_failed: AtomicU64::new(0),
        }
    }

    /// A new error entered the pipeline (after the recursion check).
    pub fn inc_captures(&self) {
        self.captures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Ingest answered 2xx.
    pub fn inc_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Network error, timeout, or non-2xx response.
    pub fn inc_send_failed(&self) {
        self.send_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            captures = self.captures(),
            deduplicated = self.deduplicated(),
            rate_limited = self.rate_limited(),
            sent = self.sent(),
            send_failed = self.send_failed(),
        );
    }

    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::Relaxed)
    }

    pub fn deduplicated(&self) -> u64 {
        self.deduplicated.load(Ordering::Relaxed)
    }

    pub fn rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn send_failed(&self) -> u64 {
        self.send_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.captures.store(0, Ordering::Relaxed);
        self.deduplicated.store(0, Ordering::Relaxed);
        self.rate_limited.store(0, Ordering::Relaxed);
        self.sent.store(0, Ordering::Relaxed);
        self.send_failed.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_captures();
        m.inc_captures();
        m.inc_deduplicated();
        m.inc_rate_limited();
        m.inc_sent();
        m.inc_send_failed();
        m.inc_send_failed();

        assert_eq!(m.captures(), 2);
        assert_eq!(m.deduplicated(), 1);
        assert_eq!(m.rate_limited(), 1);
        assert_eq!(m.sent(), 1);
        assert_eq!(m.send_failed(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_captures();
        m.inc_sent();
        m.reset();
        assert_eq!(m.captures(), 0);
        assert_eq!(m.sent(), 0);
    }

    #[traced_test]
    #[test]
    fn flush_emits_counters() {
        let m = Metrics::new();
        m.inc_captures();
        m.flush();
        assert!(logs_contain("captures=1"));
    }
}
