/// ACK Manager module - request/acknowledgement correlation
///
/// The gateway echoes a request's command name (plus `_ack`) in its reply
/// and carries no request id, so at most one request per command name can
/// be in flight. A second request for a busy command fails immediately.
///
/// Each pending entry is handed off exactly once: either the matching
/// acknowledgement removes it and delivers the envelope, or the deadline
/// removes it and the caller gets a timeout. Removal from the table is the
/// only point where the two paths meet, so whichever removes first wins.
/// Dropping a `ResponseHandle` also removes its entry, so a cancelled
/// caller never leaves its command name blocked.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::contracts::Envelope;
use crate::errors::{GatewayError, Result};
use crate::registry::Registry;

/// One outstanding request
struct PendingRequest {
    /// Distinguishes this registration from later ones under the same name
    ticket: u64,
    responder: oneshot::Sender<Envelope>,
    created_at: Instant,
}

/// Caller's side of a pending request; evicts its own entry when dropped
pub struct ResponseHandle {
    command: String,
    ticket: u64,
    receiver: oneshot::Receiver<Envelope>,
    table: Arc<Registry<PendingRequest>>,
}

impl ResponseHandle {
    pub fn command(&self) -> &str {
        &self.command
    }

    fn evict(&self) -> bool {
        self.table
            .remove_if(&self.command, |entry| entry.ticket == self.ticket)
            .is_some()
    }

    fn timeout_error(&self, deadline: Duration) -> GatewayError {
        GatewayError::RequestTimeout {
            command: self.command.clone(),
            timeout_ms: deadline.as_millis() as u64,
        }
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        if self.evict() {
            debug!(command = %self.command, "Pending request abandoned");
        }
    }
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("command", &self.command)
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

/// Pending-request table keyed by command name
pub struct PendingRequests {
    table: Arc<Registry<PendingRequest>>,
    next_ticket: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Registry::new()),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Register a request for `command`
    ///
    /// # Errors
    /// `GatewayError::DuplicateRequest` if the command is already pending.
    pub fn register(&self, command: &str) -> Result<ResponseHandle> {
        let (responder, receiver) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let entry = PendingRequest {
            ticket,
            responder,
            created_at: Instant::now(),
        };

        self.table
            .insert_unique(command, entry)
            .map_err(|_| GatewayError::DuplicateRequest(command.to_string()))?;

        Ok(ResponseHandle {
            command: command.to_string(),
            ticket,
            receiver,
            table: Arc::clone(&self.table),
        })
    }

    /// Deliver an acknowledgement to its pending request
    ///
    /// Returns `None` when nothing is waiting for this command; the envelope
    /// is then dropped as a stale or unexpected response.
    pub fn complete(&self, envelope: Envelope) -> Option<AckContext> {
        let Some(entry) = self.table.remove(&envelope.command) else {
            warn!(command = %envelope.command, sid = envelope.identity_or_empty(), "Unexpected response, dropping");
            return None;
        };

        let context = AckContext::new(&envelope.command, entry.created_at);
        debug!(command = %context.command, rtt_ms = context.rtt_ms, "Acknowledgement received");

        // The caller may have gone away between removal and send; nothing to do then.
        let _ = entry.responder.send(envelope);
        Some(context)
    }

    /// Remove the entry behind `handle` if it is still the registered one
    ///
    /// Returns true when this call evicted it.
    pub fn evict(&self, handle: &ResponseHandle) -> bool {
        handle.evict()
    }

    /// Wait for the acknowledgement or the deadline, whichever comes first
    ///
    /// The entry is gone from the table when this returns, on every path.
    pub async fn await_response(&self, mut handle: ResponseHandle, deadline: Duration) -> Result<Envelope> {
        match tokio::time::timeout(deadline, &mut handle.receiver).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(GatewayError::NotConnected),
            Err(_) => {
                if self.evict(&handle) {
                    return Err(handle.timeout_error(deadline));
                }

                // The response path removed the entry first; its envelope is on the way.
                match (&mut handle.receiver).await {
                    Ok(envelope) => Ok(envelope),
                    Err(_) => Err(handle.timeout_error(deadline)),
                }
            }
        }
    }

    pub fn is_pending(&self, command: &str) -> bool {
        self.table.contains(command)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

/// ACK context - metadata for a completed round trip
#[derive(Debug, Clone)]
pub struct AckContext {
    /// Command name without the acknowledgement suffix
    pub command: String,

    /// Round-trip time in milliseconds
    pub rtt_ms: u64,
}

impl AckContext {
    pub fn new(command: &str, created_at: Instant) -> Self {
        Self {
            command: command.to_string(),
            rtt_ms: created_at.elapsed().as_millis() as u64,
        }
    }
}
