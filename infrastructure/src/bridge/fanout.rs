//! Broadcast of backend activity to observers.
//!
//! Every framed stdout line is published whether or not anyone awaits a
//! reply for it, and whether or not it parses. Observers subscribe through
//! [`EventFanout::subscribe`]; slow observers lag and lose the oldest events
//! rather than blocking the reader task.

use omip_domain::InboundMessage;
use tokio::sync::broadcast;

/// Default buffer size per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something observers may want to know about the backend.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A worker process was spawned.
    Started { pid: Option<u32> },
    /// A stdout line, verbatim, with its typed view when it is a JSON object.
    Line {
        raw: String,
        message: Option<InboundMessage>,
    },
    /// A line the worker wrote to stderr.
    BackendStderr(String),
    /// A stdout line over the length limit was skipped.
    LineDropped { limit: usize },
    /// Reading the worker's stdout failed; the worker is being torn down.
    ReadFailed(String),
    /// `start()` could not bring the worker up.
    StartFailed(String),
    /// The worker is gone; carries the exit description.
    Exited(String),
}

/// Broadcast sender shared by the reader tasks.
#[derive(Clone)]
pub struct EventFanout {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventFanout {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    /// Publish to every current subscriber; returns how many received it.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: BridgeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventFanout {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
