//! In-memory fakes for the transport seam (testing only)
//!
//! `RecordingTransport` keeps every payload it is handed instead of sending
//! it, so pipeline decisions can be asserted without a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::TransportError;
use crate::payload::Payload;
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// Transport that records payloads in memory.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    payloads: Mutex<Vec<Payload>>,
    reject: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose `send` always fails before recording.
    pub fn rejecting() -> Self {
        let transport = Self::default();
        transport.set_rejecting(true);
        transport
    }

    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Snapshot of everything sent so far, in send order.
    pub fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.payloads.lock().unwrap().clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&self, payload: Payload) -> Result<(), TransportError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(TransportError::ShutDown);
        }
        self.payloads.lock().unwrap().push(payload);
        Ok(())
    }

    fn pending(&self) -> usize {
        0
    }

    fn flush(&self, _timeout: Duration) -> bool {
        true
    }
}
