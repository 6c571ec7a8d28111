//! Application layer for omip-bridge
//!
//! This crate contains use cases and port definitions.
//! It depends only on the domain layer.

pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use ports::{
    backend_connection::{BackendConnection, ConnectionError},
    traffic_logger::{NoTrafficLogger, TrafficEvent, TrafficLogger},
};
pub use use_cases::device_service::DeviceService;
