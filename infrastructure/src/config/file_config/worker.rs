//! Worker process configuration from TOML (`[worker]` section)

use crate::bridge::LaunchSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw worker configuration from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWorkerConfig {
    /// Interpreter executable: a bare name looked up on `PATH`, or a path
    /// relative to `base_dir`
    pub interpreter: String,
    /// Entry script, relative to `base_dir`
    pub script: String,
    /// Directory the worker runs in (default: current directory)
    pub base_dir: Option<PathBuf>,
}

impl Default for FileWorkerConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            script: "backend.py".to_string(),
            base_dir: None,
        }
    }
}

impl FileWorkerConfig {
    pub fn to_launch_spec(&self) -> LaunchSpec {
        let spec = LaunchSpec::interpreter(&self.interpreter, &self.script);
        match &self.base_dir {
            Some(dir) => spec.base_dir(dir),
            None => spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_spec_from_config() {
        let config = FileWorkerConfig {
            interpreter: "venv/bin/python".into(),
            script: "pc_software/backend.py".into(),
            base_dir: Some(PathBuf::from("/opt/omip")),
        };
        assert_eq!(
            config.to_launch_spec().to_string(),
            "venv/bin/python pc_software/backend.py"
        );
    }
}
