//! Transport-level error types.

use thiserror::Error;

/// Errors that can occur while establishing or using a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Host name could not be resolved.
    #[error("DNS error: {0}")]
    Dns(String),

    /// TCP connection was refused or could not be established.
    #[error("connect error: {0}")]
    Connect(String),

    /// TLS handshake or certificate validation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// WebSocket handshake/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Socket-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No data arrived within the inactivity window.
    #[error("ETIMEDOUT: no data received within {ms}ms")]
    Timeout { ms: u64 },

    /// `send` was called before `initialize` completed, or after close.
    #[error("transport is not connected")]
    NotConnected,

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,
}

impl TransportError {
    /// Returns `true` if the connection never came up (DNS, refused,
    /// handshake) as opposed to failing after it was established.
    pub fn is_establishment(&self) -> bool {
        matches!(self, Self::Dns(_) | Self::Connect(_) | Self::Tls(_))
    }
}
