//! Log configuration from TOML (`[log]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw log configuration from TOML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// JSONL transcript of pipe traffic; disabled when unset
    pub traffic_log: Option<PathBuf>,
}
