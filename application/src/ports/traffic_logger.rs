//! Port for a structured transcript of backend traffic.
//!
//! Defines the [`TrafficLogger`] trait for recording every line crossing the
//! process boundary (commands written, lines read, stderr, exits) to a
//! machine-readable log.
//!
//! This is separate from `tracing`-based operation logs: tracing handles
//! human-readable diagnostics, while this port captures the full wire
//! transcript (JSONL).

use serde_json::Value;

/// A single transcript record.
pub struct TrafficEvent {
    /// Record type (e.g., "outbound", "inbound", "stderr", "exit").
    pub event_type: &'static str,
    /// JSON payload with record-specific data.
    pub payload: Value,
}

impl TrafficEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}

/// Port for logging traffic records.
///
/// `log` is synchronous and non-fallible so it can be called from the
/// reader tasks without disturbing them; write failures are ignored.
pub trait TrafficLogger: Send + Sync {
    fn log(&self, event: TrafficEvent);
}

/// No-op implementation for tests and when the transcript is disabled.
pub struct NoTrafficLogger;

impl TrafficLogger for NoTrafficLogger {
    fn log(&self, _event: TrafficEvent) {}
}
