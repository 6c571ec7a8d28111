//! Request gateway: the public face of the bridge.

use crate::bridge::correlation::{CorrelationTable, ReplyReceiver};
use crate::bridge::error::{BridgeError, Result};
use crate::bridge::fanout::{BridgeEvent, DEFAULT_EVENT_CAPACITY, EventFanout};
use crate::bridge::framer::DEFAULT_MAX_LINE_LENGTH;
use crate::bridge::protocol::encode_line;
use crate::bridge::supervisor::{LaunchSpec, ProcessSupervisor, SharedTable, lock};
use async_trait::async_trait;
use omip_application::{BackendConnection, ConnectionError, NoTrafficLogger, TrafficLogger};
use omip_domain::{BackendMessage, Command, ProcessState};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Tunables for a [`BackendBridge`].
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Give up waiting for a reply after this long. `None` waits until the
    /// reply arrives or the process goes away.
    pub request_timeout: Option<Duration>,
    /// Refuse new requests for a command once this many are outstanding.
    pub max_pending_per_command: Option<usize>,
    /// Longest stdout line accepted from the worker.
    pub max_line_length: usize,
    /// Events buffered per subscriber before it lags.
    pub event_capacity: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_pending_per_command: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Bridge to the device backend process.
///
/// Owns the process supervisor, the correlation table and the event
/// fan-out. Commands go out as JSON lines on the worker's stdin; replies are
/// matched to callers by command name in FIFO order.
pub struct BackendBridge {
    supervisor: ProcessSupervisor,
    table: SharedTable,
    fanout: EventFanout,
    options: BridgeOptions,
}

impl BackendBridge {
    pub fn new(launch: LaunchSpec, options: BridgeOptions) -> Self {
        Self::with_traffic_logger(launch, options, Arc::new(NoTrafficLogger))
    }

    /// Create a bridge that records every line crossing the pipes.
    pub fn with_traffic_logger(
        launch: LaunchSpec,
        options: BridgeOptions,
        traffic: Arc<dyn TrafficLogger>,
    ) -> Self {
        let table: SharedTable = Arc::new(Mutex::new(CorrelationTable::new()));
        let fanout = EventFanout::new(options.event_capacity);
        let supervisor = ProcessSupervisor::new(
            launch,
            options.max_line_length,
            Arc::clone(&table),
            fanout.clone(),
            traffic,
        );
        Self {
            supervisor,
            table,
            fanout,
            options,
        }
    }

    /// Spawn the worker process. See [`ProcessSupervisor::start`].
    pub fn start(&self) -> Result<Option<u32>> {
        self.supervisor.start()
    }

    /// Kill the worker and wait for its pending requests to be rejected.
    pub async fn stop(&self) -> bool {
        self.supervisor.stop().await
    }

    /// Observe every line and lifecycle change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.fanout.subscribe()
    }

    pub fn state(&self) -> ProcessState {
        self.supervisor.state()
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    pub fn pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Total requests currently awaiting a reply.
    pub fn pending(&self) -> usize {
        lock(&self.table).len()
    }

    pub fn pending_for(&self, command: &str) -> usize {
        lock(&self.table).pending_for(command)
    }

    /// Fire-and-forget: write `payload` without registering for a reply.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        self.supervisor.send(payload).await
    }

    /// Write `payload` and wait for the next reply whose `command` is
    /// `expected`.
    ///
    /// Resolves with the whole reply on `status == "success"`, fails with
    /// [`BridgeError::CommandFailed`] on any other status, and with
    /// [`BridgeError::ProcessClosed`] if the worker exits first. A request
    /// that times out, or whose future is dropped after its line was
    /// committed, keeps its place in the queue so its late reply is not
    /// handed to the next caller.
    pub async fn request<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        expected: &str,
    ) -> Result<BackendMessage> {
        let line = encode_line(payload)?;

        let receiver = {
            let mut lease = self.supervisor.acquire_input().await?;
            // A line an earlier, cancelled caller committed goes out first.
            self.supervisor.drain(&mut lease).await?;

            let (ticket, receiver) =
                self.supervisor
                    .register(&lease, expected, self.options.max_pending_per_command)?;
            self.supervisor.commit_line(&mut lease, &line);

            // Once committed the line is on its way, so cancellation past this
            // point keeps the registration. Only a broken pipe withdraws it.
            if let Err(e) = self.supervisor.drain(&mut lease).await {
                if lock(&self.table).cancel(expected, ticket) {
                    debug!(
                        "Withdrew \"{}\" registration (ticket {}) after failed send",
                        expected, ticket
                    );
                }
                return Err(e);
            }
            receiver
        };

        self.await_reply(expected, receiver).await
    }

    async fn await_reply(&self, expected: &str, receiver: ReplyReceiver) -> Result<BackendMessage> {
        let outcome = match self.options.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("No \"{}\" reply within {:?}", expected, limit);
                    return Err(BridgeError::Timeout(expected.to_string()));
                }
            },
            None => receiver.await,
        };

        outcome.map_err(|_| {
            BridgeError::ProcessClosed("reply channel dropped".to_string())
        })?
    }
}

#[async_trait]
impl BackendConnection for BackendBridge {
    async fn request(
        &self,
        command: &Command,
        expected: &str,
    ) -> std::result::Result<BackendMessage, ConnectionError> {
        BackendBridge::request(self, command, expected)
            .await
            .map_err(ConnectionError::from)
    }

    async fn send(&self, command: &Command) -> std::result::Result<(), ConnectionError> {
        BackendBridge::send(self, command)
            .await
            .map_err(ConnectionError::from)
    }

    fn is_running(&self) -> bool {
        BackendBridge::is_running(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_bridge() -> BackendBridge {
        BackendBridge::new(LaunchSpec::new("sh").arg("-c").arg("cat"), BridgeOptions::default())
    }

    #[test]
    fn default_options() {
        let options = BridgeOptions::default();
        assert_eq!(options.request_timeout, None);
        assert_eq!(options.max_pending_per_command, None);
        assert_eq!(options.max_line_length, 1024 * 1024);
        assert_eq!(options.event_capacity, 256);
    }

    #[tokio::test]
    async fn request_before_start_is_not_running() {
        let bridge = idle_bridge();
        let err = bridge
            .request(&Command::Disconnect, "disconnect")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotRunning));
        assert_eq!(err.to_string(), "process not running");
        assert_eq!(bridge.pending(), 0);
        assert_eq!(bridge.state(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn send_before_start_is_not_running() {
        let bridge = idle_bridge();
        assert!(matches!(
            bridge.send(&Command::SetPage { page: 2 }).await,
            Err(BridgeError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn stop_without_process_is_noop() {
        let bridge = idle_bridge();
        assert!(!bridge.stop().await);
    }

    #[tokio::test]
    async fn port_maps_errors() {
        let bridge = idle_bridge();
        let err = BackendConnection::request(&bridge, &Command::GetPorts, "get_ports")
            .await
            .unwrap_err();
        assert_eq!(err, ConnectionError::NotRunning);
        assert!(!BackendConnection::is_running(&bridge));
    }
}
