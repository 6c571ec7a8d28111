//! Output formatter trait

use omip_domain::InboundMessage;
use serde_json::{Value, json};

/// Renders command results and backend traffic for one output format
pub trait OutputFormatter {
    /// Serial ports reported by `get_ports`
    fn ports(&self, ports: &[String]) -> String;

    /// Device configuration from `get_config`
    fn config(&self, config: &Value) -> String;

    /// A command that completed without a payload worth printing
    fn ack(&self, command: &str, detail: &str) -> String;

    /// One stdout line from the backend, with its typed view if it parsed
    fn line(&self, raw: &str, message: Option<&InboundMessage>) -> String;

    /// Process lifecycle or stderr notice (`started`, `exited`, `stderr`, ...)
    fn notice(&self, kind: &str, detail: &str) -> String;
}

/// Machine-readable output: one compact JSON document per call
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn ports(&self, ports: &[String]) -> String {
        json!({ "ports": ports }).to_string()
    }

    fn config(&self, config: &Value) -> String {
        json!({ "config": config }).to_string()
    }

    fn ack(&self, command: &str, detail: &str) -> String {
        json!({ "command": command, "status": "success", "detail": detail }).to_string()
    }

    fn line(&self, raw: &str, _message: Option<&InboundMessage>) -> String {
        // Already JSON (or noise worth seeing as-is).
        raw.to_string()
    }

    fn notice(&self, kind: &str, detail: &str) -> String {
        json!({ "bridge": kind, "detail": detail }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_ports_and_ack() {
        let f = JsonFormatter;
        let ports: Value =
            serde_json::from_str(&f.ports(&["/dev/ttyACM0".to_string()])).unwrap();
        assert_eq!(ports, json!({"ports": ["/dev/ttyACM0"]}));

        let ack: Value = serde_json::from_str(&f.ack("set_page", "page 2")).unwrap();
        assert_eq!(ack["command"], "set_page");
        assert_eq!(ack["status"], "success");
    }

    #[test]
    fn json_line_is_verbatim() {
        let raw = r#"{"type":"device_event","event":"input_digital","port_id":1,"state":true}"#;
        assert_eq!(JsonFormatter.line(raw, None), raw);
    }
}
