//! Bridge tuning from TOML (`[bridge]` section)

use crate::bridge::BridgeOptions;
use crate::bridge::fanout::DEFAULT_EVENT_CAPACITY;
use crate::bridge::framer::DEFAULT_MAX_LINE_LENGTH;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw bridge configuration from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBridgeConfig {
    /// Reply timeout in milliseconds; unset waits indefinitely
    pub request_timeout_ms: Option<u64>,
    /// Per-command cap on outstanding requests; unset is unbounded
    pub max_pending_per_command: Option<usize>,
    /// Longest accepted stdout line in bytes
    pub max_line_length: usize,
    /// Events buffered per subscriber
    pub event_capacity: usize,
}

impl Default for FileBridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: None,
            max_pending_per_command: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl FileBridgeConfig {
    pub fn to_bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
            max_pending_per_command: self.max_pending_per_command,
            max_line_length: self.max_line_length,
            event_capacity: self.event_capacity,
        }
    }
}
