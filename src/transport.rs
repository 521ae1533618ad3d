/// Gateway transport
///
/// Owns the connected unicast socket and the optional multicast listener,
/// performs the session handshake, and exposes the request API used by the
/// device factory. Both receive loops feed the same decode pipeline.
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::ack_manager::PendingRequests;
use crate::cipher::SessionCipher;
use crate::config::GatewayConfig;
use crate::contracts::{Envelope, EventClass, ReadDeviceResponse};
use crate::errors::{GatewayError, Result};
use crate::events::{EventConsumer, EventRouter};
use crate::receiver::{Link, Receiver};
use crate::transmitter::{Params, Transmitter};
use crate::{CMD_GET_ID_LIST, CMD_READ};

/// Operations the device factory needs from a gateway connection
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Identities of every child device registered under the gateway
    async fn list_child_device_identities(&self) -> Result<Vec<String>>;

    /// Model name and current payload of one device
    async fn read_device(&self, identity: &str) -> Result<ReadDeviceResponse>;

    fn register_heartbeat_consumer(&self, identity: &str, consumer: EventConsumer);

    fn register_report_consumer(&self, identity: &str, consumer: EventConsumer);
}

/// Session learned from the handshake; fixed for the life of the transport
#[derive(Debug, Clone)]
pub struct Session {
    /// Gateway's own device identity
    pub identity: String,

    /// Session token, the plaintext of every request proof
    pub token: String,
}

/// Everything that identifies the gateway we talk to
#[derive(Debug)]
pub struct GatewayIdentity {
    pub address: SocketAddr,
    cipher: SessionCipher,
    session: OnceLock<Session>,
}

impl GatewayIdentity {
    pub fn session(&self) -> Option<&Session> {
        self.session.get()
    }

    /// Proof for the current session; empty before the handshake
    fn proof(&self) -> Result<String> {
        let token = self.session.get().map(|s| s.token.as_str()).unwrap_or("");
        self.cipher.proof(token)
    }
}

pub struct Transport {
    config: GatewayConfig,
    identity: GatewayIdentity,
    unicast: ArcSwapOption<UdpSocket>,
    pending: Arc<PendingRequests>,
    router: Arc<EventRouter>,
    receiver: Arc<Receiver>,
    started: AtomicBool,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Transport {
    /// Create a stopped transport
    ///
    /// # Errors
    /// `GatewayError::InvalidToken` if the configured password is not a
    /// 16-byte AES key.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let cipher = SessionCipher::new(&config.password)
            .map_err(|e| e.context("failed to decode gateway token"))?;

        let tasks = TaskTracker::new();
        let pending = Arc::new(PendingRequests::new());
        let router = Arc::new(EventRouter::new(tasks.clone()));
        let receiver = Arc::new(Receiver::new(Arc::clone(&pending), Arc::clone(&router)));

        Ok(Self {
            identity: GatewayIdentity {
                address: config.gateway_addr(),
                cipher,
                session: OnceLock::new(),
            },
            config,
            unicast: ArcSwapOption::empty(),
            pending,
            router,
            receiver,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tasks,
        })
    }

    /// Open sockets, start both receive loops and perform the handshake
    ///
    /// Returns once the gateway identity and session token are known. A
    /// transport starts at most once; a failed start shuts it down.
    pub async fn start(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(GatewayError::NotConnected);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(GatewayError::HandshakeFailed("transport already started".to_string()));
        }

        if let Err(e) = self.open_and_handshake().await {
            self.shutdown.cancel();
            self.unicast.store(None);
            return Err(e);
        }
        Ok(())
    }

    async fn open_and_handshake(&self) -> Result<()> {
        let unicast = Arc::new(self.open_unicast().await?);
        self.spawn_loop(Arc::clone(&unicast), Link::Unicast);

        if let Some(group) = self.config.multicast {
            let multicast = Arc::new(Self::open_multicast(group).await?);
            self.spawn_loop(multicast, Link::Multicast);
        }

        self.unicast.store(Some(unicast));

        let reply = self
            .request(None, CMD_GET_ID_LIST, None)
            .await
            .map_err(|e| e.context("failed to call gateway devices list"))?;
        let session = Self::session_from(reply)?;
        let gateway_sid = session.identity.clone();

        self.identity
            .session
            .set(session)
            .map_err(|_| GatewayError::HandshakeFailed("session already established".to_string()))?;

        self.register_heartbeat_consumer(
            &gateway_sid,
            Arc::new(|_data: &str| debug!("Got gateway heartbeat")),
        );

        info!(address = %self.identity.address, sid = %gateway_sid, "Transport successfully started");
        Ok(())
    }

    /// Signal both receive loops to stop and close the unicast socket
    ///
    /// In-flight decode and consumer tasks are not awaited; see `drain`.
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.unicast.store(None);
        info!(address = %self.identity.address, "Transport stopped");
    }

    /// Wait up to `timeout` for the receive loops and in-flight decode and consumer tasks
    ///
    /// Returns true if everything finished in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }

    async fn open_unicast(&self) -> Result<UdpSocket> {
        let target = self.identity.address;
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0)),
        };
        let setup_err = |e: std::io::Error| GatewayError::SocketSetup {
            target: target.to_string(),
            reason: e.to_string(),
        };

        let socket = UdpSocket::bind(local).await.map_err(setup_err)?;
        socket.connect(target).await.map_err(setup_err)?;
        Ok(socket)
    }

    async fn open_multicast(group: SocketAddrV4) -> Result<UdpSocket> {
        let setup_err = |e: std::io::Error| GatewayError::SocketSetup {
            target: group.to_string(),
            reason: e.to_string(),
        };

        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port()))
            .await
            .map_err(setup_err)?;
        socket
            .join_multicast_v4(*group.ip(), Ipv4Addr::UNSPECIFIED)
            .map_err(setup_err)?;
        Ok(socket)
    }

    fn spawn_loop(&self, socket: Arc<UdpSocket>, link: Link) {
        self.tasks.spawn(Arc::clone(&self.receiver).run(
            socket,
            link,
            self.config.recv_buffer_size,
            self.shutdown.clone(),
            self.tasks.clone(),
        ));
    }

    fn session_from(reply: Envelope) -> Result<Session> {
        let identity = reply
            .identity
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| GatewayError::HandshakeFailed("reply carries no gateway identity".to_string()))?;
        let token = reply
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| GatewayError::HandshakeFailed("reply carries no session token".to_string()))?;

        Ok(Session { identity, token })
    }

    /// Send one request and wait for its acknowledgement
    ///
    /// Fails immediately with `DuplicateRequest`, without touching the
    /// socket, if `command` is already pending.
    pub async fn request(
        &self,
        identity: Option<&str>,
        command: &str,
        params: Option<Params>,
    ) -> Result<Envelope> {
        let handle = self.pending.register(command)?;

        if let Err(e) = self.send_request(identity, command, params).await {
            self.pending.evict(&handle);
            return Err(e.context(format!("failed to send command '{}'", command)));
        }

        self.pending
            .await_response(handle, self.config.request_timeout)
            .await
    }

    async fn send_request(&self, identity: Option<&str>, command: &str, params: Option<Params>) -> Result<()> {
        let socket = self.unicast.load_full().ok_or(GatewayError::NotConnected)?;
        let proof = self.identity.proof()?;
        let bytes = Transmitter::encode_request(identity, command, params, &proof)?;

        Transmitter::send(&socket, &bytes).await?;
        Ok(())
    }

    pub fn session(&self) -> Option<&Session> {
        self.identity.session()
    }

    /// Gateway's own identity, known after `start`
    pub fn gateway_identity(&self) -> Option<&str> {
        self.session().map(|s| s.identity.as_str())
    }

    pub fn is_running(&self) -> bool {
        self.unicast.load().is_some() && !self.shutdown.is_cancelled()
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }
}

#[async_trait]
impl DeviceTransport for Transport {
    async fn list_child_device_identities(&self) -> Result<Vec<String>> {
        let gateway_sid = self.gateway_identity().ok_or(GatewayError::NotConnected)?;

        let reply = self
            .request(Some(gateway_sid), CMD_GET_ID_LIST, None)
            .await
            .map_err(|e| e.context("failed to get devices list"))?;

        serde_json::from_str::<Vec<String>>(reply.data_or_empty())
            .map_err(|e| GatewayError::from(e).context("failed to parse get devices list response"))
    }

    async fn read_device(&self, identity: &str) -> Result<ReadDeviceResponse> {
        let reply = self
            .request(Some(identity), CMD_READ, None)
            .await
            .map_err(|e| e.context(format!("failed to read device '{}'", identity)))?;

        Ok(ReadDeviceResponse {
            model: reply.model.unwrap_or_default(),
            data: reply.data.unwrap_or_default(),
        })
    }

    fn register_heartbeat_consumer(&self, identity: &str, consumer: EventConsumer) {
        self.router.register_consumer(identity, EventClass::Heartbeat, consumer);
    }

    fn register_report_consumer(&self, identity: &str, consumer: EventConsumer) {
        self.router.register_consumer(identity, EventClass::Report, consumer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn local_config(port: u16) -> GatewayConfig {
        GatewayConfig::builder(IpAddr::V4(Ipv4Addr::LOCALHOST), "0123456789abcdef")
            .with_port(port)
            .without_multicast()
            .with_request_timeout_ms(100)
            .build()
    }

    #[test]
    fn test_bad_password_rejected() {
        let config = GatewayConfig::builder(IpAddr::V4(Ipv4Addr::LOCALHOST), "short").build();
        let err = Transport::new(config).err().unwrap();
        assert!(matches!(err.root(), GatewayError::InvalidToken { length: 5 }));
    }

    #[test]
    fn test_session_requires_identity_and_token() {
        let ok = Transport::session_from(Envelope {
            identity: Some("f0b4299a".to_string()),
            token: Some("1234567890abcdef".to_string()),
            command: "get_id_list".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ok.identity, "f0b4299a");

        let missing_token = Transport::session_from(Envelope {
            identity: Some("f0b4299a".to_string()),
            command: "get_id_list".to_string(),
            ..Default::default()
        });
        assert!(matches!(missing_token, Err(GatewayError::HandshakeFailed(_))));
    }

    #[tokio::test]
    async fn test_request_before_start_not_connected() {
        let transport = Transport::new(local_config(9)).unwrap();
        let err = transport.request(None, "read", None).await.unwrap_err();

        assert!(matches!(err.root(), GatewayError::NotConnected));
        assert!(!transport.pending().is_pending("read"));
    }

    #[tokio::test]
    async fn test_handshake_timeout_aborts_start() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let transport = Transport::new(local_config(port)).unwrap();
        let err = transport.start().await.unwrap_err();

        assert!(err.is_timeout());
        assert!(transport.session().is_none());
        assert!(!transport.is_running());
        assert!(transport.drain(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_start_after_stop_rejected() {
        let transport = Transport::new(local_config(9)).unwrap();
        transport.stop();

        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConnected));
        assert!(!transport.is_running());
    }

    #[tokio::test]
    async fn test_failed_start_is_final() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = Transport::new(local_config(silent.local_addr().unwrap().port())).unwrap();
        assert!(transport.start().await.is_err());

        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConnected));
    }
}
