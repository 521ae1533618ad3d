/// Gateway connection settings
///
/// `GatewayConfigBuilder` follows the usual fluent pattern: start from the
/// gateway address and password, override whatever differs from the
/// protocol defaults, then `build()`.
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::errors::{GatewayError, Result};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway IP address
    pub address: IpAddr,

    /// Gateway unicast port
    pub port: u16,

    /// Shared 16-byte gateway password
    pub password: String,

    /// Multicast group to listen on for broadcasts, `None` to skip the listener
    pub multicast: Option<SocketAddrV4>,

    /// Deadline for each request
    pub request_timeout: Duration,

    /// Receive buffer size per loop
    pub recv_buffer_size: usize,
}

impl GatewayConfig {
    pub fn builder(address: IpAddr, password: impl Into<String>) -> GatewayConfigBuilder {
        GatewayConfigBuilder::new(address, password)
    }

    /// Unicast endpoint of the gateway
    pub fn gateway_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

pub struct GatewayConfigBuilder {
    address: IpAddr,
    port: u16,
    password: String,
    multicast: Option<SocketAddrV4>,
    request_timeout_ms: u64,
    recv_buffer_size: usize,
}

impl GatewayConfigBuilder {
    /// Create a builder with protocol defaults
    pub fn new(address: IpAddr, password: impl Into<String>) -> Self {
        Self {
            address,
            port: crate::GATEWAY_PORT,
            password: password.into(),
            multicast: Some(SocketAddrV4::new(crate::MULTICAST_GROUP, crate::GATEWAY_PORT)),
            request_timeout_ms: crate::REQUEST_TIMEOUT_MS,
            recv_buffer_size: crate::MAX_DATAGRAM_SIZE,
        }
    }

    /// Parse the gateway address from text
    pub fn parse(address: &str, password: impl Into<String>) -> Result<Self> {
        let address: IpAddr = address
            .parse()
            .map_err(|_| GatewayError::InvalidAddress(address.to_string()))?;
        Ok(Self::new(address, password))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Listen on a different multicast group/port
    pub fn with_multicast(mut self, group: Ipv4Addr, port: u16) -> Self {
        self.multicast = Some(SocketAddrV4::new(group, port));
        self
    }

    /// Skip the multicast listener; events then arrive over unicast only
    pub fn without_multicast(mut self) -> Self {
        self.multicast = None;
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    pub fn get_request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }

    pub fn build(self) -> GatewayConfig {
        GatewayConfig {
            address: self.address,
            port: self.port,
            password: self.password,
            multicast: self.multicast,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            recv_buffer_size: self.recv_buffer_size,
        }
    }
}
