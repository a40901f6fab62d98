//! electrumrpc-ws — message-based transport over WebSocket.
//!
//! Each inbound text (or binary) frame is one message; no line framing is
//! needed on this path.

pub mod transport;

pub use transport::{WsConfig, WsTransport};
