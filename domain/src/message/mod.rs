//! Wire messages exchanged with the device backend.
//!
//! - [`command::Command`]: what we write to the worker's stdin
//! - [`backend::BackendMessage`]: what the worker prints, untyped
//! - [`inbound::InboundMessage`]: the same, validated into known shapes

pub mod backend;
pub mod command;
pub mod inbound;
