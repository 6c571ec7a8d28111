//! Infrastructure layer for omip-bridge
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: the backend process bridge, configuration
//! file loading and the JSONL traffic transcript.

pub mod bridge;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use bridge::{
    BackendBridge, BridgeError, BridgeEvent, BridgeOptions, LaunchSpec, Result,
};
pub use config::{
    ConfigIssue, ConfigIssueCode, ConfigLoader, FileBridgeConfig, FileConfig, FileLogConfig,
    FileWorkerConfig, Severity,
};
pub use logging::JsonlTrafficLogger;
