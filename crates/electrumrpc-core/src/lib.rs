//! electrumrpc-core — foundation traits and types for ElectrumRPC.
//!
//! # Overview
//!
//! ElectrumRPC is a client for the line-delimited JSON-RPC protocol spoken by
//! Electrum-style ledger indexing servers. The core crate defines:
//!
//! - [`Transport`] — the duplex channel every transport variant implements
//! - [`Connector`] — builds a fresh [`Transport`] for each connection attempt
//! - [`Framer`] — reassembles a chunked byte stream into newline-delimited messages
//! - [`JsonRpcRequest`] / [`Inbound`] — wire types
//! - [`TransportError`] — structured error type
//! - [`net`] / [`tls`] — socket dialing and TLS client configuration shared
//!   by the transport crates

pub mod error;
pub mod framer;
pub mod level;
pub mod net;
pub mod request;
pub mod tls;
pub mod transport;

pub use error::TransportError;
pub use framer::Framer;
pub use level::LogLevel;
pub use request::{parse_inbound, Inbound, InboundError, JsonRpcRequest, RpcError, RpcId};
pub use tls::TlsOptions;
pub use transport::{Connector, EventSender, Protocol, Transport, TransportEvent};
