/// Transmitter module - outbound request framing
///
/// Builds request envelopes (parameters plus the session proof, nested as
/// JSON text in `data`) and writes them to the connected gateway socket.
use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::contracts::Envelope;
use crate::errors::{GatewayError, Result};

/// Request parameters carried inside `data`
pub type Params = Map<String, Value>;

/// Transmitter - frames requests and sends them to the gateway
pub struct Transmitter;

impl Transmitter {
    /// Build the `data` text: request parameters plus the `key` proof
    pub fn encode_data(params: Option<Params>, proof: &str) -> Result<String> {
        let mut data = params.unwrap_or_default();
        data.insert("key".to_string(), Value::String(proof.to_string()));

        serde_json::to_string(&data)
            .map_err(|e| GatewayError::SerializationError(e.to_string()))
    }

    /// Serialize a full request envelope
    ///
    /// # Arguments
    /// * `identity` - Target device identity, `None` for the gateway before the handshake
    /// * `command` - Command name without suffix
    /// * `params` - Extra request parameters
    /// * `proof` - Hex proof for the current session
    pub fn encode_request(
        identity: Option<&str>,
        command: &str,
        params: Option<Params>,
        proof: &str,
    ) -> Result<Vec<u8>> {
        let data = Self::encode_data(params, proof)?;
        let envelope = Envelope::request(identity, command, data);

        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| GatewayError::SerializationError(e.to_string()))?;

        if bytes.len() > crate::MAX_DATAGRAM_SIZE {
            return Err(GatewayError::SerializationError(format!(
                "request of {} bytes exceeds datagram limit {}",
                bytes.len(),
                crate::MAX_DATAGRAM_SIZE
            )));
        }

        Ok(bytes)
    }

    /// Write an encoded request to the connected gateway socket
    pub async fn send(socket: &UdpSocket, bytes: &[u8]) -> Result<usize> {
        debug!(msg = %String::from_utf8_lossy(bytes), "Sending datagram");

        socket.send(bytes).await.map_err(|e| {
            warn!(error = %e, "Error writing to UDP");
            GatewayError::IoError(e.to_string())
        })
    }
}
