//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.

mod bridge;
mod log;
mod worker;

pub use bridge::FileBridgeConfig;
pub use log::FileLogConfig;
pub use worker::FileWorkerConfig;

use serde::{Deserialize, Serialize};

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the bridge cannot work with this configuration.
    Error,
    /// Non-fatal: works, but probably not as intended.
    Warning,
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssueCode {
    EmptyValue { field: &'static str },
    ZeroValue { field: &'static str },
}

/// A detected issue in the configuration.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    fn empty(field: &'static str) -> Self {
        Self {
            severity: Severity::Error,
            code: ConfigIssueCode::EmptyValue { field },
            message: format!("{} cannot be empty", field),
        }
    }

    fn zero(field: &'static str, severity: Severity) -> Self {
        Self {
            severity,
            code: ConfigIssueCode::ZeroValue { field },
            message: format!("{} cannot be 0", field),
        }
    }
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// How to launch the backend worker
    pub worker: FileWorkerConfig,
    /// Request/reply tuning
    pub bridge: FileBridgeConfig,
    /// Transcript settings
    pub log: FileLogConfig,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.worker.interpreter.trim().is_empty() {
            issues.push(ConfigIssue::empty("worker.interpreter"));
        }
        if self.worker.script.trim().is_empty() {
            issues.push(ConfigIssue::empty("worker.script"));
        }

        if self.bridge.max_line_length == 0 {
            issues.push(ConfigIssue::zero("bridge.max_line_length", Severity::Error));
        }
        if self.bridge.event_capacity == 0 {
            issues.push(ConfigIssue::zero("bridge.event_capacity", Severity::Error));
        }
        if self.bridge.max_pending_per_command == Some(0) {
            issues.push(ConfigIssue::zero(
                "bridge.max_pending_per_command",
                Severity::Error,
            ));
        }
        // Zero would time out every request immediately.
        if self.bridge.request_timeout_ms == Some(0) {
            issues.push(ConfigIssue::zero(
                "bridge.request_timeout_ms",
                Severity::Warning,
            ));
        }

        issues
    }

    /// Whether any issue is fatal.
    pub fn has_errors(issues: &[ConfigIssue]) -> bool {
        issues.iter().any(|i| i.severity == Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[worker]
interpreter = "venv/bin/python"
script = "backend.py"
base_dir = "/opt/omip/pc_software"

[bridge]
request_timeout_ms = 5000
max_pending_per_command = 8
max_line_length = 65536
event_capacity = 64

[log]
traffic_log = "/tmp/omip-traffic.jsonl"
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.worker.interpreter, "venv/bin/python");
        assert_eq!(
            config.worker.base_dir.as_deref(),
            Some(std::path::Path::new("/opt/omip/pc_software"))
        );
        assert_eq!(config.bridge.request_timeout_ms, Some(5000));
        assert_eq!(config.bridge.max_pending_per_command, Some(8));
        assert_eq!(config.bridge.max_line_length, 65536);
        assert_eq!(config.bridge.event_capacity, 64);
        assert!(config.log.traffic_log.is_some());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: FileConfig = toml::from_str("[bridge]\nevent_capacity = 8\n").unwrap();
        assert_eq!(config.worker, FileWorkerConfig::default());
        assert_eq!(config.bridge.event_capacity, 8);
        assert_eq!(config.log.traffic_log, None);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(FileConfig::default().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_every_issue() {
        let mut config = FileConfig::default();
        config.worker.script = "  ".into();
        config.bridge.event_capacity = 0;
        config.bridge.request_timeout_ms = Some(0);

        let issues = config.validate();
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().any(|i| i.code
            == ConfigIssueCode::EmptyValue {
                field: "worker.script"
            }));
        assert!(FileConfig::has_errors(&issues));
    }

    #[test]
    fn test_timeout_zero_is_only_a_warning() {
        let mut config = FileConfig::default();
        config.bridge.request_timeout_ms = Some(0);
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(!FileConfig::has_errors(&issues));
    }
}
