/// Infohub Core - Gateway transport for the infohub home-automation hub
///
/// This library talks to a local IoT gateway over its JSON-over-UDP protocol:
/// a token-based handshake, request/acknowledgement correlation by command
/// name, demultiplexing of unsolicited device events, and typed per-device
/// decoders that publish lock-free snapshots of the latest readings.
///
/// # Layout
/// - `transport` owns the sockets and the request API
/// - `receiver` runs the unicast and multicast receive loops
/// - `ack_manager` correlates acknowledgements with pending requests
/// - `events` routes heartbeat/report events to device consumers
/// - `sensors` builds typed sensors and keeps their snapshots current
/// - `gateway` runs the bootstrap sequence and exposes the sensor collection

pub mod errors;
pub mod contracts;
pub mod cipher;
pub mod config;
pub mod registry;
pub mod transmitter;
pub mod receiver;
pub mod ack_manager;
pub mod events;
pub mod transport;
pub mod sensors;
pub mod gateway;
pub mod report;

pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use contracts::{Envelope, EventClass, Inbound, ReadDeviceResponse};
pub use errors::{GatewayError, Result};
pub use gateway::{Gateway, SensorSource};
pub use sensors::{Capability, Sensor, SensorModel, SensorSnapshot};
pub use transport::{DeviceTransport, Transport};

/// Gateway UDP port, shared by unicast requests and multicast broadcasts
pub const GATEWAY_PORT: u16 = 9898;

/// Multicast group the gateway broadcasts events to
pub const MULTICAST_GROUP: std::net::Ipv4Addr = std::net::Ipv4Addr::new(224, 0, 0, 50);

/// Suffix that marks an inbound command as an acknowledgement
pub const ACK_SUFFIX: &str = "_ack";

/// Fixed deadline for a single request/acknowledgement round trip
pub const REQUEST_TIMEOUT_MS: u64 = 2000;

/// Receive buffer size; gateway datagrams are well below this
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Child-device listing command, also used for the handshake
pub const CMD_GET_ID_LIST: &str = "get_id_list";

/// Device read command
pub const CMD_READ: &str = "read";

/// Event command names
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_REPORT: &str = "report";
