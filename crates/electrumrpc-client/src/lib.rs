//! electrumrpc-client — multiplexed Electrum JSON-RPC client.
//!
//! # Features
//! - Many concurrent requests over one connection, matched by id
//! - Protocol version negotiation on every (re)connect
//! - Keep-alive pings on idle connections
//! - Automatic reconnect with an optional bounded [`PersistencePolicy`]
//! - Server notifications fanned out to per-method listeners
//!
//! # Example
//!
//! ```no_run
//! use electrumrpc_client::{Client, ClientOptions, Protocol};
//!
//! # async fn run() -> Result<(), electrumrpc_client::ClientError> {
//! let client = Client::new("electrum.blockstream.info", 50002, Protocol::Tls, ClientOptions::default());
//! client.connect(None).await;
//!
//! client.on_notification("blockchain.headers.subscribe", |params| {
//!     println!("new tip: {params}");
//! });
//! let tip = client.blockchain_headers_subscribe().await?;
//! println!("height {}", tip.height);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connector;
mod driver;
pub mod emitter;
pub mod error;
mod methods;
pub mod options;
pub mod policy;
pub mod types;

pub use client::{Client, ConnectionEvent, ConnectionState};
pub use connector::DefaultConnector;
pub use emitter::{EventEmitter, ListenerId};
pub use error::ClientError;
pub use options::{ClientOptions, IdGenerator, SequentialIds};
pub use policy::PersistencePolicy;
pub use types::{
    BalanceOutput, BlockHeader, BlockHeaders, FeeHistogram, HeaderNotification, HistoryItem,
    MerkleOutput, UnspentOutput, VersionOutput,
};

pub use electrumrpc_core::{Protocol, TlsOptions};
