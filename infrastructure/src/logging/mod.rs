//! Pipe traffic transcript.
//!
//! Provides [`JsonlTrafficLogger`], an append-only JSONL writer implementing
//! the [`TrafficLogger`](omip_application::TrafficLogger) port.

mod jsonl_logger;

pub use jsonl_logger::JsonlTrafficLogger;
