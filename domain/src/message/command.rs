//! Outbound commands understood by the device backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command written to the worker's stdin as `{"type": "<name>", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// List serial ports visible to the backend.
    GetPorts,
    /// Open the device on `port`.
    Connect { port: String },
    /// Close the current device connection.
    Disconnect,
    /// Fetch the stored page/button configuration.
    GetConfig,
    /// Replace the stored configuration. Not awaited.
    SaveConfig { config: Value },
    /// Switch the active page on the device. Not awaited.
    SetPage { page: u32 },
}

impl Command {
    /// Wire name of the command (`type` field).
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetPorts => "get_ports",
            Command::Connect { .. } => "connect",
            Command::Disconnect => "disconnect",
            Command::GetConfig => "get_config",
            Command::SaveConfig { .. } => "save_config",
            Command::SetPage { .. } => "set_page",
        }
    }

    /// The reply `command` a caller waits for, or `None` for fire-and-forget commands.
    pub fn expected_reply(&self) -> Option<&'static str> {
        match self {
            Command::GetPorts | Command::Connect { .. } | Command::Disconnect | Command::GetConfig => {
                Some(self.name())
            }
            Command::SaveConfig { .. } | Command::SetPage { .. } => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_type_tag() {
        assert_eq!(
            serde_json::to_value(Command::GetPorts).unwrap(),
            json!({"type": "get_ports"})
        );
        assert_eq!(
            serde_json::to_value(Command::Connect {
                port: "COM3".into()
            })
            .unwrap(),
            json!({"type": "connect", "port": "COM3"})
        );
        assert_eq!(
            serde_json::to_value(Command::SetPage { page: 3 }).unwrap(),
            json!({"type": "set_page", "page": 3})
        );
    }

    #[test]
    fn name_matches_serialized_type() {
        let commands = [
            Command::GetPorts,
            Command::Connect { port: "x".into() },
            Command::Disconnect,
            Command::GetConfig,
            Command::SaveConfig { config: json!({}) },
            Command::SetPage { page: 1 },
        ];
        for cmd in commands {
            let value = serde_json::to_value(&cmd).unwrap();
            assert_eq!(value["type"], cmd.name());
        }
    }

    #[test]
    fn fire_and_forget_commands_expect_no_reply() {
        assert_eq!(Command::GetConfig.expected_reply(), Some("get_config"));
        assert_eq!(Command::Disconnect.expected_reply(), Some("disconnect"));
        assert_eq!(
            Command::SaveConfig { config: json!({}) }.expected_reply(),
            None
        );
        assert_eq!(Command::SetPage { page: 2 }.expected_reply(), None);
    }
}
