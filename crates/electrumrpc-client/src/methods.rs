//! Typed wrappers for the Electrum protocol methods.
//!
//! Each wrapper is one [`Client::request`] plus decoding. Subscription
//! methods return the current status; later changes arrive as notifications
//! under the same method name (see [`Client::on_notification`]).

use serde_json::{json, Value};

use crate::client::Client;
use crate::error::ClientError;
use crate::types::{
    BalanceOutput, BlockHeader, BlockHeaders, FeeHistogram, HeaderNotification, HistoryItem,
    MerkleOutput, UnspentOutput, VersionOutput,
};

type Result<T> = std::result::Result<T, ClientError>;

impl Client {
    // ── server.* ─────────────────────────────────────────────────────────

    /// Cached per connection; the negotiation at connect time fills the
    /// cache for the configured client name and protocol version.
    pub async fn server_version(
        &self,
        client_name: &str,
        protocol_version: &str,
    ) -> Result<VersionOutput> {
        self.request_cached("server.version", vec![json!(client_name), json!(protocol_version)])
            .await
    }

    pub async fn server_banner(&self) -> Result<String> {
        self.request_as("server.banner", vec![]).await
    }

    pub async fn server_ping(&self) -> Result<()> {
        self.request("server.ping", vec![]).await.map(|_| ())
    }

    pub async fn server_features(&self) -> Result<Value> {
        self.request("server.features", vec![]).await
    }

    pub async fn server_peers_subscribe(&self) -> Result<Value> {
        self.request("server.peers.subscribe", vec![]).await
    }

    pub async fn server_donation_address(&self) -> Result<String> {
        self.request_as("server.donation_address", vec![]).await
    }

    // ── blockchain.scripthash.* ──────────────────────────────────────────

    pub async fn blockchain_scripthash_get_balance(&self, scripthash: &str) -> Result<BalanceOutput> {
        self.request_as("blockchain.scripthash.get_balance", vec![json!(scripthash)])
            .await
    }

    /// History of `scripthash`. The `from_height..to_height` window is only
    /// sent when the client speaks protocol 1.5; `to_height = -1` means tip.
    pub async fn blockchain_scripthash_get_history(
        &self,
        scripthash: &str,
        from_height: i64,
        to_height: i64,
    ) -> Result<Vec<HistoryItem>> {
        let params = if self.options().protocol_version == "1.5" {
            vec![json!(scripthash), json!(from_height), json!(to_height)]
        } else {
            vec![json!(scripthash)]
        };
        self.request_as("blockchain.scripthash.get_history", params).await
    }

    pub async fn blockchain_scripthash_get_mempool(&self, scripthash: &str) -> Result<Vec<HistoryItem>> {
        self.request_as("blockchain.scripthash.get_mempool", vec![json!(scripthash)])
            .await
    }

    pub async fn blockchain_scripthash_listunspent(
        &self,
        scripthash: &str,
    ) -> Result<Vec<UnspentOutput>> {
        self.request_as("blockchain.scripthash.listunspent", vec![json!(scripthash)])
            .await
    }

    /// Current status hash, `None` when the script has no history.
    pub async fn blockchain_scripthash_subscribe(&self, scripthash: &str) -> Result<Option<String>> {
        self.request_as("blockchain.scripthash.subscribe", vec![json!(scripthash)])
            .await
    }

    pub async fn blockchain_scripthash_unsubscribe(&self, scripthash: &str) -> Result<bool> {
        self.request_as("blockchain.scripthash.unsubscribe", vec![json!(scripthash)])
            .await
    }

    // ── blockchain.block.* / headers ─────────────────────────────────────

    pub async fn blockchain_block_header(&self, height: u64, cp_height: u64) -> Result<BlockHeader> {
        self.request_as("blockchain.block.header", vec![json!(height), json!(cp_height)])
            .await
    }

    pub async fn blockchain_block_headers(
        &self,
        start_height: u64,
        count: u32,
        cp_height: u64,
    ) -> Result<BlockHeaders> {
        self.request_as(
            "blockchain.block.headers",
            vec![json!(start_height), json!(count), json!(cp_height)],
        )
        .await
    }

    pub async fn blockchain_headers_subscribe(&self) -> Result<HeaderNotification> {
        self.request_as("blockchain.headers.subscribe", vec![]).await
    }

    // ── fees ─────────────────────────────────────────────────────────────

    /// Fee rate in coin units per kilobyte to confirm within `blocks`;
    /// `-1` when the server has no estimate.
    pub async fn blockchain_estimatefee(&self, blocks: u32) -> Result<f64> {
        self.request_as("blockchain.estimatefee", vec![json!(blocks)]).await
    }

    pub async fn blockchain_relayfee(&self) -> Result<f64> {
        self.request_as("blockchain.relayfee", vec![]).await
    }

    pub async fn mempool_get_fee_histogram(&self) -> Result<FeeHistogram> {
        self.request_as("mempool.get_fee_histogram", vec![]).await
    }

    // ── blockchain.transaction.* ─────────────────────────────────────────

    /// Returns the transaction hash.
    pub async fn blockchain_transaction_broadcast(&self, raw_tx: &str) -> Result<String> {
        self.request_as("blockchain.transaction.broadcast", vec![json!(raw_tx)])
            .await
    }

    /// Raw transaction hex. Cached per connection.
    pub async fn blockchain_transaction_get(&self, tx_hash: &str) -> Result<String> {
        self.request_cached("blockchain.transaction.get", vec![json!(tx_hash), json!(false)])
            .await
    }

    pub async fn blockchain_transaction_get_merkle(
        &self,
        tx_hash: &str,
        height: u64,
    ) -> Result<MerkleOutput> {
        self.request_as(
            "blockchain.transaction.get_merkle",
            vec![json!(tx_hash), json!(height)],
        )
        .await
    }
}
