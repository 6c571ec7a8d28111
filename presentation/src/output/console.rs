//! Console output formatter for backend replies and events

use crate::output::formatter::OutputFormatter;
use colored::Colorize;
use omip_domain::{DeviceEvent, InboundMessage, Reply};
use serde_json::Value;

/// Formats backend output for a human at a terminal
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    fn device_event(event: &DeviceEvent) -> String {
        match event {
            DeviceEvent::InputDigital { port_id, state } => {
                let state = if *state { "ON".green() } else { "OFF".dimmed() };
                format!("{} port {:>2} {}", "[digital]".cyan(), port_id, state)
            }
            DeviceEvent::InputAnalog { port_id, value } => {
                format!("{} port {:>2} = {}", "[analog] ".cyan(), port_id, value)
            }
            DeviceEvent::InputEncoder { port_id, steps } => {
                format!("{} port {:>2} {:+}", "[encoder]".cyan(), port_id, steps)
            }
        }
    }

    fn reply(reply: &Reply) -> String {
        match reply {
            Reply::Failed { command, message } => {
                format!("{} {}: {}", "[reply]  ".red(), command, message)
            }
            other => format!("{} {} ok", "[reply]  ".green(), other.command()),
        }
    }

    fn ack_text(command: &str, detail: &str) -> String {
        if detail.is_empty() {
            command.to_string()
        } else {
            format!("{}: {}", command, detail)
        }
    }

    /// Indent a multi-line string
    pub fn indent(text: &str, prefix: &str) -> String {
        text.lines()
            .map(|line| format!("{}{}", prefix, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn ports(&self, ports: &[String]) -> String {
        if ports.is_empty() {
            return "No serial ports found".dimmed().to_string();
        }
        let mut output = format!("{}\n", "Serial ports:".cyan().bold());
        for port in ports {
            output.push_str(&format!("  * {}\n", port));
        }
        output.trim_end().to_string()
    }

    fn config(&self, config: &Value) -> String {
        let body = serde_json::to_string_pretty(config).unwrap_or_else(|_| "{}".to_string());
        format!(
            "{}\n{}",
            "Device configuration:".cyan().bold(),
            Self::indent(&body, "  ")
        )
    }

    fn ack(&self, command: &str, detail: &str) -> String {
        format!("{} {}", "✓".green().bold(), Self::ack_text(command, detail))
    }

    fn line(&self, raw: &str, message: Option<&InboundMessage>) -> String {
        match message {
            Some(InboundMessage::DeviceEvent(event)) => Self::device_event(event),
            Some(InboundMessage::Reply(reply)) => Self::reply(reply),
            Some(InboundMessage::BackendError { message }) => {
                format!("{} {}", "[error]  ".red().bold(), message)
            }
            Some(InboundMessage::Unknown(_)) => format!("{} {}", "[other]  ".dimmed(), raw),
            None => format!("{} {}", "[noise]  ".dimmed(), raw.dimmed()),
        }
    }

    fn notice(&self, kind: &str, detail: &str) -> String {
        let label = format!("[{}]", kind);
        let label = match kind {
            "started" => label.green(),
            "stderr" => label.yellow(),
            _ => label.red(),
        };
        format!("{} {}", label.bold(), detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_list_and_empty() {
        colored::control::set_override(false);
        let f = ConsoleFormatter;
        assert_eq!(
            f.ports(&["/dev/ttyACM0".into(), "COM3".into()]),
            "Serial ports:\n  * /dev/ttyACM0\n  * COM3"
        );
        assert_eq!(f.ports(&[]), "No serial ports found");
    }

    #[test]
    fn device_events_are_readable() {
        colored::control::set_override(false);
        let f = ConsoleFormatter;
        let digital = InboundMessage::DeviceEvent(DeviceEvent::InputDigital {
            port_id: 3,
            state: true,
        });
        assert_eq!(f.line("", Some(&digital)), "[digital] port  3 ON");

        let encoder = InboundMessage::DeviceEvent(DeviceEvent::InputEncoder {
            port_id: 12,
            steps: -2,
        });
        assert_eq!(f.line("", Some(&encoder)), "[encoder] port 12 -2");
    }

    #[test]
    fn noise_and_failures() {
        colored::control::set_override(false);
        let f = ConsoleFormatter;
        assert_eq!(f.line("Loading...", None), "[noise]   Loading...");

        let failed = InboundMessage::Reply(Reply::Failed {
            command: "connect".into(),
            message: "device busy".into(),
        });
        assert_eq!(f.line("", Some(&failed)), "[reply]   connect: device busy");
    }

    #[test]
    fn config_is_indented() {
        colored::control::set_override(false);
        let out = ConsoleFormatter.config(&serde_json::json!({"1": []}));
        assert_eq!(out, "Device configuration:\n  {\n    \"1\": []\n  }");
    }
}
