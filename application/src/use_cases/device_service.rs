//! Device service use case
//!
//! Typed commands for the configurator UI. Each awaited command sends its
//! request through a [`BackendConnection`] and turns the matched reply into
//! a plain value; fire-and-forget commands only write.

use crate::ports::backend_connection::{BackendConnection, ConnectionError};
use omip_domain::{BackendMessage, Command, config_from, ports_from};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Use case exposing the device commands of the backend protocol.
pub struct DeviceService<C: BackendConnection + 'static> {
    connection: Arc<C>,
}

impl<C: BackendConnection + 'static> DeviceService<C> {
    pub fn new(connection: Arc<C>) -> Self {
        Self { connection }
    }

    /// List the serial ports the backend can see.
    ///
    /// A reply whose `ports` is not a list yields an empty vector.
    pub async fn list_ports(&self) -> Result<Vec<String>, ConnectionError> {
        let reply = self.call(Command::GetPorts).await?;
        let ports = ports_from(reply.field("ports"));
        debug!("Backend reported {} port(s)", ports.len());
        Ok(ports)
    }

    /// Connect the backend to the device on `port`.
    pub async fn connect(&self, port: impl Into<String>) -> Result<(), ConnectionError> {
        let port = port.into();
        self.call(Command::Connect { port: port.clone() }).await?;
        info!("Device connected on {}", port);
        Ok(())
    }

    /// Disconnect the device.
    ///
    /// Fails with [`ConnectionError::NotRunning`] when there is no backend
    /// process; nothing is spawned.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.call(Command::Disconnect).await?;
        info!("Device disconnected");
        Ok(())
    }

    /// Fetch the stored configuration; a reply without `config` yields `{}`.
    pub async fn get_config(&self) -> Result<Value, ConnectionError> {
        let reply = self.call(Command::GetConfig).await?;
        Ok(config_from(reply.field("config")))
    }

    /// Store a new configuration. Does not wait for the backend's acknowledgement.
    pub async fn save_config(&self, config: Value) -> Result<(), ConnectionError> {
        self.connection.send(&Command::SaveConfig { config }).await
    }

    /// Switch the active page. Does not wait for the backend's acknowledgement.
    pub async fn set_page(&self, page: u32) -> Result<(), ConnectionError> {
        self.connection.send(&Command::SetPage { page }).await
    }

    async fn call(&self, command: Command) -> Result<BackendMessage, ConnectionError> {
        let expected = command.expected_reply().unwrap_or(command.name());
        self.connection.request(&command, expected).await
    }
}
