/// Core data structures for the gateway wire protocol
///
/// Every datagram in either direction is a single JSON envelope. The `data`
/// field is opaque to the transport: it is JSON text carried as a string and
/// only interpreted by whoever consumes it (the listing request, a sensor
/// decoder, and so on).
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::{GatewayError, Result};
use crate::{ACK_SUFFIX, EVENT_HEARTBEAT, EVENT_REPORT};

/// Envelope - one protocol message
///
/// Empty optional fields are omitted on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    /// Device identity the message is addressed to or originates from
    #[serde(rename = "sid", default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// Device model name, present on read acknowledgements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Opaque JSON payload
    #[serde(
        default,
        deserialize_with = "opaque_payload",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<String>,

    /// Session token, issued by the gateway on listing acknowledgements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Command name, suffixed with `_ack` on acknowledgements
    #[serde(rename = "cmd")]
    pub command: String,
}

/// Accept `data` either as JSON text in a string or as an inline JSON value
fn opaque_payload<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

impl Envelope {
    /// Create an outbound envelope
    pub fn request(identity: Option<&str>, command: &str, data: String) -> Self {
        Self {
            identity: identity.filter(|sid| !sid.is_empty()).map(str::to_string),
            model: None,
            data: Some(data),
            token: None,
            command: command.to_string(),
        }
    }

    /// Identity or an empty string when absent
    pub fn identity_or_empty(&self) -> &str {
        self.identity.as_deref().unwrap_or("")
    }

    /// Payload or an empty string when absent
    pub fn data_or_empty(&self) -> &str {
        self.data.as_deref().unwrap_or("")
    }
}

/// Classified inbound datagram
///
/// The command name has already been stripped of the acknowledgement suffix.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to one of our requests
    Acknowledgement(Envelope),

    /// Unsolicited message pushed by the gateway or a device
    Event(Envelope),
}

impl Inbound {
    /// Parse a datagram and classify it by its command suffix
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(datagram)
            .map_err(|e| GatewayError::DeserializationError(format!("malformed envelope: {}", e)))?;

        Ok(Self::classify(envelope))
    }

    /// Classify an already parsed envelope
    pub fn classify(mut envelope: Envelope) -> Self {
        match envelope.command.strip_suffix(ACK_SUFFIX) {
            Some(name) => {
                envelope.command = name.to_string();
                Self::Acknowledgement(envelope)
            }
            None => Self::Event(envelope),
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Acknowledgement(envelope) | Self::Event(envelope) => envelope,
        }
    }

    pub fn is_acknowledgement(&self) -> bool {
        matches!(self, Self::Acknowledgement(_))
    }
}

/// Event classes a device consumer can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Heartbeat,
    Report,
}

impl EventClass {
    /// Map an unsuffixed event command to its class
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            EVENT_HEARTBEAT => Some(Self::Heartbeat),
            EVENT_REPORT => Some(Self::Report),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heartbeat => EVENT_HEARTBEAT,
            Self::Report => EVENT_REPORT,
        }
    }
}

/// Reply to a device read: model name plus the raw payload
#[derive(Debug, Clone, PartialEq)]
pub struct ReadDeviceResponse {
    pub model: String,
    pub data: String,
}
