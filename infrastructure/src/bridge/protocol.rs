//! Line-level protocol helpers.
//!
//! - [`LineKind`] / [`classify_line`]: decide whether a framed line is a
//!   reply (has `command`), an unsolicited event, or not JSON at all.
//! - [`encode_line`]: single-line JSON plus the terminating newline.

use omip_domain::{BackendMessage, MessageParseError};
use serde::Serialize;

/// Classification of one framed line from the worker.
#[derive(Debug)]
pub enum LineKind {
    /// Carries a `command` field; routed to the correlation table.
    Reply(BackendMessage),
    /// Valid JSON object without `command`; only fanned out.
    Event(BackendMessage),
    /// Not a JSON object. Logged and dropped from correlation.
    Malformed(MessageParseError),
}

/// Classify a framed line by parsing it and inspecting `command`.
pub fn classify_line(line: &str) -> LineKind {
    match BackendMessage::parse(line) {
        Ok(msg) if msg.is_reply() => LineKind::Reply(msg),
        Ok(msg) => LineKind::Event(msg),
        Err(e) => LineKind::Malformed(e),
    }
}

/// Serialize `payload` as one JSON line terminated by `\n`.
///
/// `serde_json` escapes control characters inside strings, so the result
/// never contains an embedded newline.
pub fn encode_line<T: Serialize + ?Sized>(payload: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(payload)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use omip_domain::Command;

    #[test]
    fn classify_reply() {
        let kind = classify_line(r#"{"command":"disconnect","status":"success"}"#);
        assert!(matches!(kind, LineKind::Reply(m) if m.command.as_deref() == Some("disconnect")));
    }

    #[test]
    fn classify_event() {
        let kind = classify_line(r#"{"type":"device_event","event":"input_analog"}"#);
        assert!(matches!(kind, LineKind::Event(_)));
    }

    #[test]
    fn classify_noise() {
        assert!(matches!(
            classify_line("Loading omip_pb2..."),
            LineKind::Malformed(_)
        ));
        assert!(matches!(classify_line("\"just a string\""), LineKind::Malformed(_)));
    }

    #[test]
    fn encode_is_single_line() {
        let cmd = Command::SaveConfig {
            config: serde_json::json!({"1": [{"action": "ctrl+c\nctrl+v"}]}),
        };
        let line = encode_line(&cmd).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.starts_with(r#"{"type":"save_config""#));
    }
}
