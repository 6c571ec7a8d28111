//! CLI entrypoint for omip-bridge
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use omip_application::{DeviceService, NoTrafficLogger, TrafficLogger};
use omip_domain::{InboundMessage, Reply};
use omip_infrastructure::{
    BackendBridge, BridgeEvent, ConfigLoader, FileConfig, JsonlTrafficLogger, Severity,
};
use omip_presentation::{
    BridgeCommand, Cli, ConsoleFormatter, JsonFormatter, OutputFormat, OutputFormatter,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the backend to acknowledge a fire-and-forget command
/// before the worker is stopped.
const ACK_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_ref());
        return Ok(());
    }

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref())
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?
    };

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            Severity::Error => error!("Config: {}", issue.message),
            Severity::Warning => warn!("Config: {}", issue.message),
        }
    }
    if FileConfig::has_errors(&issues) {
        bail!("Invalid configuration");
    }

    let Some(command) = cli.command else {
        bail!("No command given. Run with --help for usage.");
    };

    let formatter: Box<dyn OutputFormatter> = match cli.output {
        OutputFormat::Text => Box::new(ConsoleFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    };

    // === Dependency Injection ===
    let traffic: Arc<dyn TrafficLogger> = match cli.traffic_log.or(config.log.traffic_log) {
        Some(path) => match JsonlTrafficLogger::new(&path) {
            Some(logger) => {
                info!("Recording backend traffic to {}", path.display());
                Arc::new(logger)
            }
            None => Arc::new(NoTrafficLogger),
        },
        None => Arc::new(NoTrafficLogger),
    };

    let bridge = Arc::new(BackendBridge::with_traffic_logger(
        config.worker.to_launch_spec(),
        config.bridge.to_bridge_options(),
        traffic,
    ));

    bridge.start().context("Failed to start backend")?;

    let outcome = run(&command, &bridge, formatter.as_ref()).await;

    bridge.stop().await;
    outcome
}

/// stderr always; optionally a plain-text copy in `log_file`.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn run(
    command: &BridgeCommand,
    bridge: &Arc<BackendBridge>,
    out: &dyn OutputFormatter,
) -> Result<()> {
    let service = DeviceService::new(Arc::clone(bridge));

    match command {
        BridgeCommand::Ports => {
            let ports = service.list_ports().await?;
            println!("{}", out.ports(&ports));
        }
        BridgeCommand::Connect { port } => {
            service.connect(port.as_str()).await?;
            println!("{}", out.ack("connect", port));
        }
        BridgeCommand::Disconnect => {
            service.disconnect().await?;
            println!("{}", out.ack("disconnect", ""));
        }
        BridgeCommand::Config => {
            let config = service.get_config().await?;
            println!("{}", out.config(&config));
        }
        BridgeCommand::SaveConfig { file } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let config: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            if !config.is_object() {
                bail!("{} must contain a JSON object", file.display());
            }

            let mut events = bridge.subscribe();
            service.save_config(config).await?;
            wait_for_ack(&mut events, "save_config").await?;
            println!("{}", out.ack("save_config", &file.display().to_string()));
        }
        BridgeCommand::SetPage { page } => {
            let mut events = bridge.subscribe();
            service.set_page(*page).await?;
            wait_for_ack(&mut events, "set_page").await?;
            println!("{}", out.ack("set_page", &page.to_string()));
        }
        BridgeCommand::Monitor { port } => {
            let events = bridge.subscribe();
            if let Some(port) = port {
                service.connect(port.as_str()).await?;
                println!("{}", out.ack("connect", port));
            }
            monitor(events, out).await;
        }
    }

    Ok(())
}

/// Wait briefly for the reply to a command nobody registered for.
///
/// A missing acknowledgement is only a warning: the command was written.
async fn wait_for_ack(events: &mut broadcast::Receiver<BridgeEvent>, command: &str) -> Result<()> {
    let outcome = tokio::time::timeout(ACK_GRACE, async {
        loop {
            match events.recv().await {
                Ok(BridgeEvent::Line {
                    message: Some(InboundMessage::Reply(reply)),
                    ..
                }) if reply.command() == command => {
                    return match reply {
                        Reply::Failed { message, .. } => Err(anyhow!(message)),
                        _ => Ok(()),
                    };
                }
                Ok(BridgeEvent::Exited(reason)) => return Err(anyhow!(reason)),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            warn!("No \"{}\" acknowledgement within {:?}", command, ACK_GRACE);
            Ok(())
        }
    }
}

/// Print every backend event until Ctrl-C or the worker exits.
async fn monitor(mut events: broadcast::Receiver<BridgeEvent>, out: &dyn OutputFormatter) {
    info!("Monitoring backend events (Ctrl-C to stop)");

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(BridgeEvent::Line { raw, message }) => {
                println!("{}", out.line(&raw, message.as_ref()))
            }
            Ok(BridgeEvent::BackendStderr(line)) => println!("{}", out.notice("stderr", &line)),
            Ok(BridgeEvent::Started { pid }) => {
                let pid = pid.map(|p| p.to_string()).unwrap_or_default();
                println!("{}", out.notice("started", &pid));
            }
            Ok(BridgeEvent::LineDropped { limit }) => {
                println!("{}", out.notice("line-dropped", &format!("over {} bytes", limit)))
            }
            Ok(BridgeEvent::ReadFailed(reason)) => {
                println!("{}", out.notice("read-failed", &reason))
            }
            Ok(BridgeEvent::StartFailed(reason)) => {
                println!("{}", out.notice("start-failed", &reason))
            }
            Ok(BridgeEvent::Exited(reason)) => {
                println!("{}", out.notice("exited", &reason));
                break;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Monitor fell behind, {} event(s) skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
