//! Error types for the backend bridge

use omip_application::ConnectionError;
use omip_domain::ProcessState;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur when supervising or talking to the backend process
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to spawn backend process: {0}")]
    SpawnError(#[source] std::io::Error),

    #[error("Backend executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Failed to establish {0} pipe to backend process")]
    PipeUnavailable(&'static str),

    #[error("Backend process is already {0}")]
    AlreadyRunning(ProcessState),

    #[error("process not running")]
    NotRunning,

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The backend answered with a non-success status.
    #[error("{message}")]
    CommandFailed { command: String, message: String },

    #[error("process closed while awaiting reply: {0}")]
    ProcessClosed(String),

    #[error("timed out waiting for \"{0}\" reply")]
    Timeout(String),

    #[error("too many pending \"{command}\" requests (limit {limit})")]
    TooManyPending { command: String, limit: usize },
}

impl From<BridgeError> for ConnectionError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotRunning => ConnectionError::NotRunning,
            BridgeError::SendFailed(e) => ConnectionError::SendFailed(e.to_string()),
            BridgeError::CommandFailed { command, message } => {
                ConnectionError::CommandFailed { command, message }
            }
            BridgeError::ProcessClosed(reason) => ConnectionError::ProcessClosed(reason),
            BridgeError::Timeout(command) => ConnectionError::Timeout(command),
            other => ConnectionError::Other(other.to_string()),
        }
    }
}
