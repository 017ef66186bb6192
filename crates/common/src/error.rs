use thiserror::Error;

use crate::validation::ValidationError;

/// Error types for the NetPass tunnel client
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout waiting for {0}")]
    Timeout(&'static str),

    #[error("Broker error: {0}")]
    BrokerError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("TLS configuration error: {0}")]
    TlsError(String),

    #[error("No network adapter reports a hardware address")]
    NoAdapters,

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
