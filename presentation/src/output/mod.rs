//! Output formatting for backend replies and events

pub mod console;
pub mod formatter;
