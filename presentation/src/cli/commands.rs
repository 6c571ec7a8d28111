//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// How results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, colored when the terminal supports it
    #[default]
    Text,
    /// One JSON document per result or event
    Json,
}

/// CLI arguments for omip-bridge
#[derive(Parser, Debug)]
#[command(name = "omip-bridge")]
#[command(author, version, about = "Drive the OMIP device backend from the command line")]
#[command(long_about = r#"
omip-bridge starts the OMIP device backend as a child process, sends it one
command over its stdin/stdout JSON-lines protocol, prints the reply, and
stops it again.

Configuration is merged from (in priority order):
1. OMIP_<SECTION>__<KEY>   Environment variables (OMIP_BRIDGE__EVENT_CAPACITY=64)
2. --config <path>         Explicit config file
3. ./omip.toml or ./.omip.toml         Project-level config
4. ~/.config/omip-bridge/config.toml   Global config
5. Built-in defaults

Example:
  omip-bridge ports
  omip-bridge connect /dev/ttyACM0
  omip-bridge save-config mapping.json
  omip-bridge -v monitor
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<BridgeCommand>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,

    /// Also write diagnostic logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Record all pipe traffic as JSONL (overrides `[log] traffic_log`)
    #[arg(long, value_name = "PATH", global = true)]
    pub traffic_log: Option<PathBuf>,
}

/// One backend command per invocation
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    /// List serial ports visible to the backend
    Ports,
    /// Connect the backend to the device on PORT
    Connect {
        /// Serial port, e.g. /dev/ttyACM0 or COM3
        port: String,
    },
    /// Disconnect from the device
    Disconnect,
    /// Print the device's current configuration
    Config,
    /// Upload a configuration from a JSON file
    SaveConfig {
        /// JSON file holding the configuration object
        file: PathBuf,
    },
    /// Switch the device to another page
    SetPage {
        page: u32,
    },
    /// Print backend events until Ctrl-C
    Monitor {
        /// Connect to this port before monitoring
        #[arg(long, value_name = "PORT")]
        port: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn long_help_lists_every_config_source() {
        let help = Cli::command()
            .get_long_about()
            .map(|s| s.to_string())
            .unwrap_or_default();
        for source in ["OMIP_<SECTION>__<KEY>", "--config", "./.omip.toml", "config.toml"] {
            assert!(help.contains(source), "missing {source}");
        }
    }

    #[test]
    fn parses_subcommand_with_globals() {
        let cli = Cli::parse_from(["omip-bridge", "connect", "/dev/ttyACM0", "-vv", "-o", "json"]);
        assert_eq!(
            cli.command,
            Some(BridgeCommand::Connect {
                port: "/dev/ttyACM0".into()
            })
        );
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn parses_set_page_and_monitor() {
        let cli = Cli::parse_from(["omip-bridge", "set-page", "3"]);
        assert_eq!(cli.command, Some(BridgeCommand::SetPage { page: 3 }));

        let cli = Cli::parse_from(["omip-bridge", "monitor", "--port", "COM3"]);
        assert_eq!(
            cli.command,
            Some(BridgeCommand::Monitor {
                port: Some("COM3".into())
            })
        );
    }

    #[test]
    fn rejects_non_numeric_page() {
        assert!(Cli::try_parse_from(["omip-bridge", "set-page", "two"]).is_err());
    }
}
