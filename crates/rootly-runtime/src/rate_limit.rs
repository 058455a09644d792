//! Global sliding-window rate limiter.
//!
//! Independent of fingerprint: this is the backstop for bursts of distinct
//! errors (a dependency outage producing varied messages) that dedup alone
//! lets through.

use std::collections::VecDeque;
use std::time::Duration;

/// Sliding window length.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Maximum accepted captures per window.
pub const DEFAULT_RATE_LIMIT_MAX: usize = 20;

/// Timestamps of accepted captures, oldest first.
#[derive(Debug)]
pub struct RateLimiter {
    window_ms: u64,
    max: usize,
    timestamps: VecDeque<u64>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_WINDOW, DEFAULT_RATE_LIMIT_MAX)
    }
}

impl RateLimiter {
    pub fn new(window: Duration, max: usize) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            max,
            timestamps: VecDeque::with_capacity(max),
        }
    }

    /// Returns `true` (reject, nothing recorded) when the window is full.
    /// Otherwise records `now_ms` and returns `false`.
    pub fn is_rate_limited(&mut self, now_ms: u64) -> bool {
        let expired = self
            .timestamps
            .partition_point(|&ts| now_ms.saturating_sub(ts) > self.window_ms);
        if expired > 0 {
            self.timestamps.drain(..expired);
        }

        if self.timestamps.len() >= self.max {
            return true;
        }
        self.timestamps.push_back(now_ms);
        false
    }

    /// Captures currently counted against the window.
    pub fn in_window(&self) -> usize {
        self.timestamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_rejects() {
        let mut limiter = RateLimiter::default();
        for i in 0..20 {
            assert!(!limiter.is_rate_limited(i * 100), "capture {i} rejected");
        }
        assert!(limiter.is_rate_limited(2_500));
        assert_eq!(limiter.in_window(), 20);
    }

    #[test]
    fn rejected_attempts_are_not_recorded() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), 2);
        assert!(!limiter.is_rate_limited(0));
        assert!(!limiter.is_rate_limited(0));
        for t in 1..50 {
            assert!(limiter.is_rate_limited(t * 1_000));
        }
        assert_eq!(limiter.in_window(), 2);
        // both accepted entries expire strictly after 60s
        assert!(limiter.is_rate_limited(60_000));
        assert!(!limiter.is_rate_limited(60_001));
    }

    #[test]
    fn window_slides() {
        let mut limiter = RateLimiter::default();
        for i in 0..20 {
            assert!(!limiter.is_rate_limited(i * 1_000));
        }
        assert!(limiter.is_rate_limited(30_000));

        // entries at 0 and 1000 fall out
        assert!(!limiter.is_rate_limited(61_001));
        assert!(!limiter.is_rate_limited(61_001));
        assert!(limiter.is_rate_limited(61_001));
        assert_eq!(limiter.in_window(), 20);
    }

    #[test]
    fn burst_trim_in_one_pass() {
        let mut limiter = RateLimiter::default();
        for _ in 0..20 {
            limiter.is_rate_limited(0);
        }
        assert!(!limiter.is_rate_limited(120_000));
        assert_eq!(limiter.in_window(), 1);
    }
}
