/// Error types for gateway transport operations
///
/// Startup failures (socket setup, handshake, device bootstrap) are wrapped
/// with context and returned to the caller. Runtime failures inside the
/// receive pipeline never surface here; they are logged where they happen.
use std::fmt;
use std::io;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway protocol error enumeration
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// I/O error (network send/receive failure)
    IoError(String),

    /// Socket could not be bound, connected or joined to the multicast group
    SocketSetup { target: String, reason: String },

    /// Configured gateway password is not a valid AES-128 key
    InvalidToken { length: usize },

    /// Gateway address could not be parsed
    InvalidAddress(String),

    /// Envelope could not be serialized
    SerializationError(String),

    /// Datagram or payload is not the expected JSON
    DeserializationError(String),

    /// Initial round trip did not yield a gateway identity and session token
    HandshakeFailed(String),

    /// Proof generation failed for the current session token
    EncryptionError(String),

    /// Another request with the same command is still awaiting its acknowledgement
    DuplicateRequest(String),

    /// No acknowledgement arrived before the request deadline
    RequestTimeout { command: String, timeout_ms: u64 },

    /// Transport is stopped or was never started
    NotConnected,

    /// A present payload field could not be parsed
    FieldDecode { field: &'static str, value: String },

    /// Error wrapped with the step that produced it
    Context { context: String, source: Box<GatewayError> },
}

impl GatewayError {
    /// Wrap this error with a description of the failing step
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping any context wrappers
    pub fn root(&self) -> &GatewayError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::RequestTimeout { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self.root(), Self::DuplicateRequest(_))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(msg) => write!(f, "I/O error: {}", msg),
            Self::SocketSetup { target, reason } => {
                write!(f, "Failed to set up socket for {}: {}", target, reason)
            }
            Self::InvalidToken { length } => {
                write!(f, "Invalid gateway password: expected 16 bytes, got {}", length)
            }
            Self::InvalidAddress(addr) => write!(f, "Invalid gateway address: {}", addr),
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Self::HandshakeFailed(msg) => write!(f, "Gateway handshake failed: {}", msg),
            Self::EncryptionError(msg) => write!(f, "Encryption error: {}", msg),
            Self::DuplicateRequest(cmd) => {
                write!(f, "Command '{}' is already awaiting response", cmd)
            }
            Self::RequestTimeout { command, timeout_ms } => {
                write!(f, "Request '{}' timed out after {} ms", command, timeout_ms)
            }
            Self::NotConnected => write!(f, "Transport is not connected"),
            Self::FieldDecode { field, value } => {
                write!(f, "Failed to parse {} from '{}'", field, value)
            }
            Self::Context { context, source } => write!(f, "{}: {}", context, source),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Context { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for GatewayError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::DeserializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain() {
        let err = GatewayError::RequestTimeout {
            command: "read".to_string(),
            timeout_ms: 2000,
        }
        .context("failed to read device '158d0001'")
        .context("gateway startup");

        assert!(err.is_timeout());
        assert!(!err.is_duplicate());
        assert_eq!(
            err.to_string(),
            "gateway startup: failed to read device '158d0001': Request 'read' timed out after 2000 ms"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_duplicate_display() {
        let err = GatewayError::DuplicateRequest("get_id_list".to_string());
        assert!(err.is_duplicate());
        assert_eq!(err.to_string(), "Command 'get_id_list' is already awaiting response");
    }
}
