//! Transfer accounting.
//!
//! The client keeps a running tally of what the negotiation actually
//! buys: bytes received on the wire versus bytes of reconstructed
//! payload handed to the caller.

use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct TransferStats {
    /// Requests issued, retries included.
    pub requests: usize,
    /// Responses that arrived as values-only packets.
    pub optimized_responses: usize,
    /// State conflicts that forced a renegotiation.
    pub conflicts: usize,
    /// Bytes of payload handed to the caller.
    pub payload_bytes: u64,
    /// Bytes actually received on the wire.
    pub wire_bytes: u64,
}

impl TransferStats {
    pub(crate) fn record(&mut self, optimized: bool, wire_len: usize, payload_len: usize) {
        self.requests += 1;
        if optimized {
            self.optimized_responses += 1;
        }
        self.wire_bytes += wire_len as u64;
        self.payload_bytes += payload_len as u64;
    }

    pub(crate) fn record_conflict(&mut self) {
        self.conflicts += 1;
    }

    /// Payload bytes that never crossed the wire. Negative when the
    /// negotiation never kicked in and headers were wasted.
    pub fn bytes_saved(&self) -> i64 {
        self.payload_bytes as i64 - self.wire_bytes as i64
    }

    /// Saved fraction of the total payload, 0.0 when nothing was
    /// transferred.
    pub fn savings_ratio(&self) -> f64 {
        if self.payload_bytes == 0 {
            return 0.0;
        }

        self.bytes_saved() as f64 / self.payload_bytes as f64
    }
}
