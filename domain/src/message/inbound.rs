//! Typed view of inbound backend messages.
//!
//! Every line the worker prints is first parsed into a [`BackendMessage`] and
//! then validated into an [`InboundMessage`]. Anything that does not match a
//! known shape ends up in [`InboundMessage::Unknown`] rather than being
//! trusted implicitly.

use crate::message::backend::BackendMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A reply to one of our commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ports { ports: Vec<String> },
    Connected { port: Option<String> },
    Disconnected,
    Config { config: Value },
    ConfigSaved,
    PageSet { page: Option<u64> },
    /// The backend reported a non-success status.
    Failed { command: String, message: String },
    /// A successful reply to a command this layer has no typed shape for.
    Other {
        command: String,
        payload: Map<String, Value>,
    },
}

impl Reply {
    /// The `command` this reply answers.
    pub fn command(&self) -> &str {
        match self {
            Reply::Ports { .. } => "get_ports",
            Reply::Connected { .. } => "connect",
            Reply::Disconnected => "disconnect",
            Reply::Config { .. } => "get_config",
            Reply::ConfigSaved => "save_config",
            Reply::PageSet { .. } => "set_page",
            Reply::Failed { command, .. } | Reply::Other { command, .. } => command,
        }
    }
}

/// Input reported by the physical device, relayed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    InputDigital { port_id: u32, state: bool },
    InputAnalog { port_id: u32, value: i64 },
    InputEncoder { port_id: u32, steps: i64 },
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Reply(Reply),
    DeviceEvent(DeviceEvent),
    /// Unsolicited error report (`{"type":"error"}` or `{"error": ...}`).
    BackendError { message: String },
    Unknown(Value),
}

impl InboundMessage {
    /// Classify a parsed backend message.
    pub fn classify(msg: &BackendMessage) -> Self {
        if let Some(command) = &msg.command {
            return InboundMessage::Reply(classify_reply(command, msg));
        }

        match msg.field("type").and_then(Value::as_str) {
            Some("device_event") => {
                match serde_json::from_value::<DeviceEvent>(Value::Object(msg.extra.clone())) {
                    Ok(event) => InboundMessage::DeviceEvent(event),
                    Err(_) => InboundMessage::Unknown(msg.to_value()),
                }
            }
            Some("error") => InboundMessage::BackendError {
                message: msg.message.clone().unwrap_or_default(),
            },
            _ => match msg.field("error").and_then(Value::as_str) {
                Some(error) => InboundMessage::BackendError {
                    message: error.to_string(),
                },
                None => InboundMessage::Unknown(msg.to_value()),
            },
        }
    }

    /// Parse and classify a raw line, or `None` if it is not a JSON object.
    pub fn from_line(line: &str) -> Option<Self> {
        BackendMessage::parse(line).ok().map(|m| Self::classify(&m))
    }
}

fn classify_reply(command: &str, msg: &BackendMessage) -> Reply {
    if !msg.is_success() {
        return Reply::Failed {
            command: command.to_string(),
            message: msg.failure_message(),
        };
    }

    match command {
        "get_ports" => Reply::Ports {
            ports: ports_from(msg.field("ports")),
        },
        "connect" => Reply::Connected {
            port: msg.field("port").and_then(Value::as_str).map(str::to_string),
        },
        "disconnect" => Reply::Disconnected,
        "get_config" => Reply::Config {
            config: config_from(msg.field("config")),
        },
        "save_config" => Reply::ConfigSaved,
        "set_page" => Reply::PageSet {
            page: msg.field("page").and_then(Value::as_u64),
        },
        other => Reply::Other {
            command: other.to_string(),
            payload: msg.extra.clone(),
        },
    }
}

/// Port list from a `get_ports` payload; anything that is not a list is empty.
pub fn ports_from(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Configuration object from a `get_config` payload; missing becomes `{}`.
pub fn config_from(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(line: &str) -> InboundMessage {
        InboundMessage::from_line(line).expect("valid line")
    }

    #[test]
    fn ports_reply() {
        assert_eq!(
            classify(r#"{"command":"get_ports","status":"success","ports":["COM3","COM4"]}"#),
            InboundMessage::Reply(Reply::Ports {
                ports: vec!["COM3".into(), "COM4".into()]
            })
        );
    }

    #[test]
    fn ports_reply_with_non_list_is_empty() {
        assert_eq!(
            classify(r#"{"command":"get_ports","status":"success","ports":"COM3"}"#),
            InboundMessage::Reply(Reply::Ports { ports: vec![] })
        );
    }

    #[test]
    fn failed_reply_keeps_message() {
        assert_eq!(
            classify(r#"{"command":"connect","status":"error","message":"Port not specified"}"#),
            InboundMessage::Reply(Reply::Failed {
                command: "connect".into(),
                message: "Port not specified".into()
            })
        );
    }

    #[test]
    fn config_reply_defaults_to_empty_object() {
        assert_eq!(
            classify(r#"{"command":"get_config","status":"success"}"#),
            InboundMessage::Reply(Reply::Config { config: json!({}) })
        );
    }

    #[test]
    fn unknown_command_reply_is_other() {
        let msg = classify(r#"{"command":"ping","status":"success","uptime":3}"#);
        match msg {
            InboundMessage::Reply(Reply::Other { command, payload }) => {
                assert_eq!(command, "ping");
                assert_eq!(payload.get("uptime"), Some(&json!(3)));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn device_events() {
        assert_eq!(
            classify(r#"{"type":"device_event","event":"input_digital","port_id":4,"state":true}"#),
            InboundMessage::DeviceEvent(DeviceEvent::InputDigital {
                port_id: 4,
                state: true
            })
        );
        assert_eq!(
            classify(r#"{"type":"device_event","event":"input_analog","port_id":1,"value":512}"#),
            InboundMessage::DeviceEvent(DeviceEvent::InputAnalog {
                port_id: 1,
                value: 512
            })
        );
    }

    #[test]
    fn malformed_device_event_is_unknown() {
        assert!(matches!(
            classify(r#"{"type":"device_event","event":"input_digital"}"#),
            InboundMessage::Unknown(_)
        ));
    }

    #[test]
    fn backend_error_shapes() {
        assert_eq!(
            classify(r#"{"type":"error","message":"Serial error: gone"}"#),
            InboundMessage::BackendError {
                message: "Serial error: gone".into()
            }
        );
        assert_eq!(
            classify(r#"{"error":"Invalid JSON"}"#),
            InboundMessage::BackendError {
                message: "Invalid JSON".into()
            }
        );
    }

    #[test]
    fn non_json_line_is_none() {
        assert!(InboundMessage::from_line("hello from python").is_none());
    }
}
