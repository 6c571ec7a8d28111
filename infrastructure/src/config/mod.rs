//! Configuration file loading for omip-bridge
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `OMIP_<SECTION>__<KEY>` environment variables
//! 2. `--config <path>` specified file
//! 3. Project root: `./omip.toml` or `./.omip.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/omip-bridge/config.toml`
//! 5. Fallback: `~/.config/omip-bridge/config.toml`
//! 6. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigIssue, ConfigIssueCode, FileBridgeConfig, FileConfig, FileLogConfig, FileWorkerConfig,
    Severity,
};
pub use loader::ConfigLoader;
