//! Fingerprinting and duplicate suppression.
//!
//! A fingerprint is `message:first-frame`, where the first frame is the
//! first non-empty stack line after the header, whitespace-collapsed.
//! Identical fingerprints seen within the dedup window are suppressed.
//!
//! The table is capped. When an insert pushes it past the cap, the oldest
//! half (by recorded timestamp, not by access) is dropped in one pass.
//! Timestamp ties are broken by first insertion, so the entry just
//! recorded always survives.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::debug;

use crate::event::CapturedError;

/// Repeats inside this window are suppressed.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(10);

/// Hard cap on remembered fingerprints.
pub const DEFAULT_MAX_FINGERPRINTS: usize = 500;

/// Returned if fingerprinting itself fails.
pub const UNKNOWN_FINGERPRINT: &str = "unknown";

/// Compute the dedup key for an error. Never panics.
pub fn compute_fingerprint(error: &CapturedError) -> String {
    panic::catch_unwind(AssertUnwindSafe(|| {
        fingerprint_parts(error.message(), error.stack())
    }))
    .unwrap_or_else(|_| UNKNOWN_FINGERPRINT.to_string())
}

/// `message:frame`, with `Unknown` standing in for an empty message.
pub fn fingerprint_parts(message: &str, stack: &str) -> String {
    let message = if message.is_empty() {
        "Unknown"
    } else {
        message
    };
    format!("{message}:{}", stable_stack_frame(stack))
}

fn stable_stack_frame(stack: &str) -> String {
    stack
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_sent: u64,
    seq: u64,
}

/// Fingerprint -> last-sent timestamp (epoch millis).
#[derive(Debug)]
pub struct DedupTable {
    window_ms: u64,
    max_entries: usize,
    next_seq: u64,
    last_sent: HashMap<String, Entry>,
}

impl Default for DedupTable {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW, DEFAULT_MAX_FINGERPRINTS)
    }
}

impl DedupTable {
    pub fn new(window: Duration, max_entries: usize) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            max_entries,
            next_seq: 0,
            last_sent: HashMap::new(),
        }
    }

    /// Returns `true` if `fingerprint` was recorded less than one window
    /// before `now_ms`; the entry is left untouched in that case.
    /// Otherwise records `now_ms` and returns `false`.
    pub fn should_deduplicate(&mut self, fingerprint: &str, now_ms: u64) -> bool {
        if let Some(entry) = self.last_sent.get_mut(fingerprint) {
            if now_ms.saturating_sub(entry.last_sent) < self.window_ms {
                return true;
            }
            // Re-recording keeps the original insertion position.
            entry.last_sent = now_ms;
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.last_sent.insert(
            fingerprint.to_string(),
            Entry {
                last_sent: now_ms,
                seq,
            },
        );

        if self.last_sent.len() > self.max_entries {
            let evicted = self.evict_oldest();
            debug!(
                event = "dedup.evicted",
                evicted = evicted,
                remaining = self.last_sent.len(),
                "fingerprint table over capacity"
            );
        }
        false
    }

    /// Drop the oldest `max_entries / 2` entries (at least one), ordered by
    /// `(timestamp, insertion)`.
    fn evict_oldest(&mut self) -> usize {
        let mut entries: Vec<(u64, u64, String)> = self
            .last_sent
            .iter()
            .map(|(fingerprint, entry)| (entry.last_sent, entry.seq, fingerprint.clone()))
            .collect();
        entries.sort_unstable_by_key(|(ts, seq, _)| (*ts, *seq));

        let to_delete = (self.max_entries / 2).max(1);
        for (_, _, fingerprint) in entries.into_iter().take(to_delete) {
            self.last_sent.remove(&fingerprint);
        }
        to_delete
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.last_sent.contains_key(fingerprint)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}
