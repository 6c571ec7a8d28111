//! Reply correlation by command name.
//!
//! The backend protocol has no request IDs: a reply only names the
//! `command` it answers. [`CorrelationTable`] keeps one FIFO queue of
//! waiting callers per command name, so the oldest caller for a name gets
//! the first reply for that name. Different names are independent.

use crate::bridge::error::BridgeError;
use omip_domain::BackendMessage;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Outcome delivered to a waiting caller.
pub type ReplyResult = std::result::Result<BackendMessage, BridgeError>;

/// Receiving half handed back to the caller by [`CorrelationTable::enqueue`].
pub type ReplyReceiver = oneshot::Receiver<ReplyResult>;

/// Identifies one registration so it can be undone.
pub type Ticket = u64;

/// One outstanding call awaiting its reply.
struct PendingRequest {
    ticket: Ticket,
    tx: oneshot::Sender<ReplyResult>,
}

/// Command name -> FIFO of pending requests.
///
/// A name maps only to a non-empty queue; a queue that empties is removed
/// immediately.
#[derive(Default)]
pub struct CorrelationTable {
    queues: HashMap<String, VecDeque<PendingRequest>>,
    next_ticket: Ticket,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter at the tail of `command`'s queue.
    pub fn enqueue(&mut self, command: &str) -> (Ticket, ReplyReceiver) {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);

        self.queues
            .entry(command.to_string())
            .or_default()
            .push_back(PendingRequest { ticket, tx });
        trace!("Correlation: enqueued \"{}\" (ticket {})", command, ticket);

        (ticket, rx)
    }

    /// Undo a registration whose command never reached the backend.
    ///
    /// Searches from the tail, where a just-made registration sits. Returns
    /// whether the ticket was found.
    pub fn cancel(&mut self, command: &str, ticket: Ticket) -> bool {
        let Some(queue) = self.queues.get_mut(command) else {
            return false;
        };
        let removed = match queue.iter().rposition(|p| p.ticket == ticket) {
            Some(index) => queue.remove(index).is_some(),
            None => false,
        };
        if queue.is_empty() {
            self.queues.remove(command);
        }
        removed
    }

    /// Settle the oldest waiter for `message.command`.
    ///
    /// Messages without `command` are not replies and are ignored. A
    /// non-success status rejects the waiter with the backend's message (or a
    /// default naming the command); otherwise the waiter receives the whole
    /// message. Returns whether a waiter was popped.
    pub fn fulfill_one(&mut self, message: BackendMessage) -> bool {
        let Some(command) = message.command.clone() else {
            return false;
        };
        let Some(queue) = self.queues.get_mut(&command) else {
            debug!("Correlation: no pending request for \"{}\" reply", command);
            return false;
        };
        let pending = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(&command);
        }
        let Some(pending) = pending else {
            return false;
        };

        let outcome = if message.is_success() {
            Ok(message)
        } else {
            Err(BridgeError::CommandFailed {
                message: message.failure_message(),
                command: command.clone(),
            })
        };

        if pending.tx.send(outcome).is_err() {
            // Caller gave up (timeout or dropped future); the reply still
            // belongs to its slot.
            debug!(
                "Correlation: \"{}\" reply for abandoned request (ticket {})",
                command, pending.ticket
            );
        }
        true
    }

    /// Reject every pending request with `reason` and clear the table.
    ///
    /// Returns how many requests were rejected.
    pub fn reject_all(&mut self, reason: &str) -> usize {
        let mut rejected = 0;
        for (_, queue) in self.queues.drain() {
            for pending in queue {
                let _ = pending
                    .tx
                    .send(Err(BridgeError::ProcessClosed(reason.to_string())));
                rejected += 1;
            }
        }
        if rejected > 0 {
            debug!("Correlation: rejected {} pending request(s): {}", rejected, reason);
        }
        rejected
    }

    /// Number of requests waiting for `command`.
    pub fn pending_for(&self, command: &str) -> usize {
        self.queues.get(command).map_or(0, VecDeque::len)
    }

    /// Total number of waiting requests.
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Number of command names with at least one waiter.
    pub fn command_count(&self) -> usize {
        self.queues.len()
    }
}
