use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::ack_manager::PendingRequests;
use crate::contracts::Inbound;
use crate::events::EventRouter;

/// Which socket a datagram arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Unicast,
    Multicast,
}

impl Link {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unicast => "unicast",
            Self::Multicast => "multicast",
        }
    }
}

/// Decode pipeline shared by both receive loops
pub struct Receiver {
    pending: Arc<PendingRequests>,
    router: Arc<EventRouter>,
}

impl Receiver {
    pub fn new(pending: Arc<PendingRequests>, router: Arc<EventRouter>) -> Self {
        Self { pending, router }
    }

    /// Decode one datagram and hand it to the request table or the event router
    ///
    /// Malformed datagrams are logged and dropped.
    pub fn handle_datagram(&self, datagram: &[u8]) {
        debug!(msg = %String::from_utf8_lossy(datagram), "Received UDP message");

        match Inbound::decode(datagram) {
            Ok(Inbound::Acknowledgement(envelope)) => {
                self.pending.complete(envelope);
            }
            Ok(Inbound::Event(envelope)) => {
                self.router.process_event(envelope);
            }
            Err(e) => warn!(error = %e, "Failed to decode datagram"),
        }
    }

    /// Receive until `shutdown` fires, decoding each datagram on its own task
    ///
    /// Receive errors are logged and the loop keeps going.
    pub async fn run(
        self: Arc<Self>,
        socket: Arc<UdpSocket>,
        link: Link,
        buffer_size: usize,
        shutdown: CancellationToken,
        tasks: TaskTracker,
    ) {
        let mut buffer = vec![0u8; buffer_size];

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(link = link.as_str(), "Stopped listening for UDP data");
                    return;
                }
                received = socket.recv_from(&mut buffer) => received,
            };

            match received {
                Ok((0, _)) => {}
                Ok((size, from)) => {
                    debug!(link = link.as_str(), %from, size, "Datagram received");
                    let datagram = buffer[..size].to_vec();
                    let receiver = Arc::clone(&self);
                    tasks.spawn(async move {
                        receiver.handle_datagram(&datagram);
                    });
                }
                Err(e) => {
                    error!(link = link.as_str(), error = %e, "Error reading from UDP");
                    // Connected sockets surface ICMP errors here; avoid a hot loop.
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}
