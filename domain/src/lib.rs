//! Domain layer for omip-bridge
//!
//! This crate contains the wire model spoken between the configurator and
//! the device backend process. It has no dependencies on infrastructure or
//! presentation concerns.
//!
//! # Core Concepts
//!
//! ## Commands and replies
//!
//! The protocol has no request IDs. A reply names the `command` it answers,
//! so two outstanding requests for the same command are told apart only by
//! arrival order. This holds as long as the backend answers in the order it
//! received requests.
//!
//! ## Events
//!
//! Lines without a `command` field are unsolicited events (device input,
//! backend error reports) and are only ever broadcast, never correlated.

pub mod message;
pub mod process;

// Re-export commonly used types
pub use message::{
    backend::{BackendMessage, MessageParseError, SUCCESS_STATUS, default_failure_message},
    command::Command,
    inbound::{DeviceEvent, InboundMessage, Reply, config_from, ports_from},
};
pub use process::ProcessState;
