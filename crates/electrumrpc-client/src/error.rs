//! Client-level error types.

use thiserror::Error;

use electrumrpc_core::error::TransportError;
use electrumrpc_core::request::RpcError;

/// Errors surfaced by [`Client`](crate::Client) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `request` was called while no connection is established.
    #[error("connection not established")]
    NotConnected,

    /// The connection went away while the request was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server answered with an error.
    #[error("{0}")]
    Rpc(RpcError),

    /// Writing the request failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `ClientOptions::request_timeout` elapsed without a reply.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The result could not be decoded into the expected type.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The exchange violated the protocol (e.g. a reused request id).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The background connection task is gone.
    #[error("client task stopped")]
    Shutdown,
}

impl ClientError {
    /// Returns `true` for connection-scoped failures, as opposed to a server
    /// rejecting this particular request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionClosed | Self::Transport(_) | Self::Shutdown
        )
    }

    /// The server's error code, when it sent a structured error.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::Rpc(e) => e.code,
            _ => None,
        }
    }
}
