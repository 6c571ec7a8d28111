//! Presentation layer for omip-bridge
//!
//! This crate contains the CLI definition and the formatters that render
//! backend replies and events for the terminal.

pub mod cli;
pub mod output;

// Re-export commonly used types
pub use cli::commands::{BridgeCommand, Cli, OutputFormat};
pub use output::console::ConsoleFormatter;
pub use output::formatter::{JsonFormatter, OutputFormatter};
