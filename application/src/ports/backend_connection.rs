//! Backend connection port
//!
//! Defines the interface the UI-facing use cases use to talk to the device
//! backend process.

use async_trait::async_trait;
use omip_domain::{BackendMessage, Command};
use thiserror::Error;

/// Errors surfaced to callers of a backend connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("process not running")]
    NotRunning,

    #[error("send failed: {0}")]
    SendFailed(String),

    /// The backend replied with a non-success status.
    #[error("{message}")]
    CommandFailed { command: String, message: String },

    #[error("process closed while awaiting reply: {0}")]
    ProcessClosed(String),

    #[error("timed out waiting for \"{0}\" reply")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

/// Connection to the out-of-process device backend.
///
/// Implementations (adapters) live in the infrastructure layer.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    /// Send `command` and wait for the next reply whose `command` field is
    /// `expected`. Replies for the same name are matched in call order.
    async fn request(
        &self,
        command: &Command,
        expected: &str,
    ) -> Result<BackendMessage, ConnectionError>;

    /// Send `command` without waiting for any reply.
    async fn send(&self, command: &Command) -> Result<(), ConnectionError>;

    /// Whether a live backend process exists.
    fn is_running(&self) -> bool;
}
