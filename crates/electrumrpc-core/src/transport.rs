//! The `Transport` trait — the duplex channel under every client connection.

use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Edge events a transport pushes to its owner.
///
/// Transports never change the client's connection state themselves; they
/// only report what happened on the wire. A fatal read-side failure is
/// reported as `Error` followed by exactly one `Close`; a clean EOF as `End`
/// followed by `Close`.
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection is up and ready to send/receive.
    Connect,
    /// One complete inbound message, in arrival order.
    Message(String),
    /// The peer finished sending.
    End,
    /// The connection is gone.
    Close,
    /// A transport failure, e.g. the inactivity timeout.
    Error(TransportError),
}

/// Channel a transport reports its [`TransportEvent`]s on.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// A duplex connection to a remote server.
///
/// Both variants (byte stream, message socket) look identical through this
/// trait. A transport is used for a single connection: once closed it is
/// discarded and the [`Connector`] builds a new one.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Perform the connection handshake. Resolves once the transport can
    /// send and receive; emits [`TransportEvent::Connect`] on success.
    async fn initialize(&mut self) -> Result<(), TransportError>;

    /// Write one newline-terminated message.
    async fn send(&mut self, data: &str) -> Result<(), TransportError>;

    /// Tear the connection down. Safe to call more than once.
    async fn close(&mut self);

    /// `true` between a successful connect and any close/end/error.
    fn is_connected(&self) -> bool;

    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> &str;
}

/// Builds a fresh [`Transport`] for each connection attempt.
pub trait Connector: Send + Sync + 'static {
    fn create(&self, events: EventSender) -> Box<dyn Transport>;
}

/// Wire protocol / transport kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain TCP byte stream.
    Tcp,
    /// TLS over TCP byte stream (`ssl` is accepted as an alias).
    Tls,
    /// Plain WebSocket.
    Ws,
    /// WebSocket over TLS.
    Wss,
}

impl Protocol {
    pub fn is_encrypted(self) -> bool {
        matches!(self, Self::Tls | Self::Wss)
    }

    /// `true` for the message-based (WebSocket) variants.
    pub fn is_message_based(self) -> bool {
        matches!(self, Self::Ws | Self::Wss)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tls => "tls",
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "tls" | "ssl" => Ok(Self::Tls),
            "ws" => Ok(Self::Ws),
            "wss" => Ok(Self::Wss),
            other => Err(format!("not supported protocol {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parsing() {
        assert_eq!("ssl".parse::<Protocol>().unwrap(), Protocol::Tls);
        assert_eq!("WSS".parse::<Protocol>().unwrap(), Protocol::Wss);
        assert!("udp".parse::<Protocol>().is_err());
    }

    #[test]
    fn protocol_classes() {
        assert!(Protocol::Tls.is_encrypted());
        assert!(!Protocol::Tls.is_message_based());
        assert!(Protocol::Ws.is_message_based());
        assert!(!Protocol::Ws.is_encrypted());
        assert_eq!(Protocol::Wss.to_string(), "wss");
    }
}
