//! TCP dialing shared by every transport variant.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpSocket, TcpStream};

use crate::error::TransportError;

/// Resolve `host:port` and connect to the first address that accepts.
///
/// The socket has `SO_KEEPALIVE` set before connecting and `TCP_NODELAY`
/// after, so protocol lines are never held back for coalescing. The whole
/// operation (resolution included) is bounded by `timeout`.
pub async fn dial(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
    let attempt = async {
        let addrs = lookup_host((host, port))
            .await
            .map_err(|e| TransportError::Dns(format!("{host}:{port}: {e}")))?;

        let mut last_err = None;
        for addr in addrs {
            match connect_addr(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "address refused, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TransportError::Dns(format!("{host}:{port}: no addresses"))))
    };

    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| TransportError::Timeout {
            ms: timeout.as_millis() as u64,
        })?
}

async fn connect_addr(addr: SocketAddr) -> Result<TcpStream, TransportError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(true)?;
    let stream = socket
        .connect(addr)
        .await
        .map_err(|e| TransportError::Connect(format!("{addr}: {e}")))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
