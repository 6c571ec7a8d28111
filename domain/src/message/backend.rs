//! Raw backend message as it arrives on the worker's stdout.

use serde_json::{Map, Value};
use thiserror::Error;

/// Status value the backend uses to mark a successful reply.
pub const SUCCESS_STATUS: &str = "success";

/// Errors produced when a line cannot be turned into a [`BackendMessage`].
#[derive(Error, Debug)]
pub enum MessageParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// An untyped record produced by the worker process.
///
/// `command` is only populated when the field is a string; a message without
/// it is an unsolicited event and never takes part in reply correlation.
/// Every other field is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendMessage {
    pub command: Option<String>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub extra: Map<String, Value>,
}

impl BackendMessage {
    /// Parse one framed line.
    pub fn parse(line: &str) -> Result<Self, MessageParseError> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_value(value)
    }

    /// Build from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, MessageParseError> {
        let mut map = match value {
            Value::Object(map) => map,
            other => return Err(MessageParseError::NotAnObject(json_kind(&other))),
        };

        Ok(Self {
            command: take_string(&mut map, "command"),
            status: take_string(&mut map, "status"),
            message: take_string(&mut map, "message"),
            extra: map,
        })
    }

    /// Whether this message answers a request (carries a `command`).
    pub fn is_reply(&self) -> bool {
        self.command.is_some()
    }

    /// Whether `status` is exactly the success marker.
    ///
    /// A missing status counts as failure.
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(SUCCESS_STATUS)
    }

    /// Explanation used when rejecting a failed reply.
    ///
    /// Falls back to `Backend command "<command>" failed` when the backend
    /// sent no (or an empty) `message`.
    pub fn failure_message(&self) -> String {
        match self.message.as_deref() {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => default_failure_message(self.command.as_deref().unwrap_or("unknown")),
        }
    }

    /// Look up a payload field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Reassemble the message into a single JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        if let Some(c) = &self.command {
            map.insert("command".to_string(), Value::String(c.clone()));
        }
        if let Some(s) = &self.status {
            map.insert("status".to_string(), Value::String(s.clone()));
        }
        if let Some(m) = &self.message {
            map.insert("message".to_string(), Value::String(m.clone()));
        }
        Value::Object(map)
    }
}

/// Fallback failure text for a command that failed without a message.
pub fn default_failure_message(command: &str) -> String {
    format!("Backend command \"{}\" failed", command)
}

/// Remove `key` from the map if it holds a string; non-string values stay in place.
fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !matches!(map.get(key), Some(Value::String(_))) {
        return None;
    }
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_with_payload() {
        let msg = BackendMessage::parse(
            r#"{"command":"get_ports","status":"success","ports":["COM3","COM4"]}"#,
        )
        .unwrap();
        assert_eq!(msg.command.as_deref(), Some("get_ports"));
        assert!(msg.is_reply());
        assert!(msg.is_success());
        assert_eq!(msg.field("ports"), Some(&serde_json::json!(["COM3", "COM4"])));
        assert!(!msg.extra.contains_key("command"));
    }

    #[test]
    fn parse_event_without_command() {
        let msg = BackendMessage::parse(r#"{"type":"device_event","event":"input_digital"}"#)
            .unwrap();
        assert!(!msg.is_reply());
        assert_eq!(msg.field("type"), Some(&serde_json::json!("device_event")));
    }

    #[test]
    fn non_string_command_is_not_a_reply() {
        let msg = BackendMessage::parse(r#"{"command":42,"status":"success"}"#).unwrap();
        assert!(!msg.is_reply());
        assert_eq!(msg.field("command"), Some(&serde_json::json!(42)));
    }

    #[test]
    fn rejects_non_object_and_garbage() {
        assert!(matches!(
            BackendMessage::parse("[1,2,3]"),
            Err(MessageParseError::NotAnObject("array"))
        ));
        assert!(matches!(
            BackendMessage::parse("Traceback (most recent call last):"),
            Err(MessageParseError::Json(_))
        ));
    }

    #[test]
    fn missing_status_is_failure() {
        let msg = BackendMessage::parse(r#"{"command":"connect"}"#).unwrap();
        assert!(!msg.is_success());
    }

    #[test]
    fn failure_message_prefers_backend_text() {
        let msg = BackendMessage::parse(
            r#"{"command":"get_ports","status":"error","message":"device busy"}"#,
        )
        .unwrap();
        assert_eq!(msg.failure_message(), "device busy");
    }

    #[test]
    fn failure_message_default_names_command() {
        let msg = BackendMessage::parse(r#"{"command":"connect","status":"error","message":""}"#)
            .unwrap();
        assert_eq!(msg.failure_message(), "Backend command \"connect\" failed");
    }

    #[test]
    fn to_value_restores_known_fields() {
        let line = r#"{"command":"set_page","status":"success","page":2}"#;
        let msg = BackendMessage::parse(line).unwrap();
        let expected: Value = serde_json::from_str(line).unwrap();
        assert_eq!(msg.to_value(), expected);
    }
}
