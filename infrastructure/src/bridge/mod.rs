//! Backend process bridge
//!
//! Runs the device backend as a child process and talks to it with one JSON
//! object per line over stdin/stdout.
//!
//! ```text
//! caller ──request()──▶ BackendBridge ──line──▶ worker stdin
//!                          │  ▲
//!                register  │  │ fulfill_one
//!                          ▼  │
//!                     CorrelationTable ◀── stdout reader ◀── worker stdout
//!                                              │
//!                                              ▼
//!                                         EventFanout ──▶ subscribers
//! ```

pub mod correlation;
pub mod error;
pub mod fanout;
pub mod framer;
pub mod gateway;
pub mod protocol;
pub mod supervisor;

pub use correlation::CorrelationTable;
pub use error::{BridgeError, Result};
pub use fanout::{BridgeEvent, EventFanout};
pub use framer::{FramerError, LineFramer};
pub use gateway::{BackendBridge, BridgeOptions};
pub use supervisor::{LaunchSpec, ProcessSupervisor, describe_exit};
