//! electrumrpc-tcp — byte-stream transport (plain TCP or TLS).
//!
//! # Features
//! - `SO_KEEPALIVE` + `TCP_NODELAY` on every socket
//! - Optional TLS via rustls (webpki roots, or accept-any for self-signed servers)
//! - Newline framing of the inbound stream
//! - Inactivity timeout between a write and the first byte of the reply

pub mod transport;

pub use transport::{TcpConfig, TcpTransport, DEFAULT_INACTIVITY_TIMEOUT};
