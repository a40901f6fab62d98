//! Response shapes of the Electrum protocol methods.

use serde::{Deserialize, Serialize};

/// `server.version` result: `[server_software, protocol_version]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionOutput(pub String, pub String);

impl VersionOutput {
    pub fn server_software(&self) -> &str {
        &self.0
    }

    pub fn protocol_version(&self) -> &str {
        &self.1
    }
}

/// Amounts in satoshis. Unconfirmed may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceOutput {
    pub confirmed: i64,
    pub unconfirmed: i64,
}

/// One entry of a script hash history or mempool listing.
///
/// `height` is `0` for mempool transactions and `-1` when some input is
/// itself unconfirmed; `fee` is only present for mempool entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub height: i64,
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub height: i64,
    pub tx_hash: String,
    pub tx_pos: u32,
    pub value: u64,
}

/// `blockchain.headers.subscribe` result and notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderNotification {
    pub height: u64,
    pub hex: String,
}

/// `blockchain.block.header` result: the raw header, or the header plus a
/// merkle proof when a checkpoint height was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockHeader {
    Proof {
        branch: Vec<String>,
        header: String,
        root: String,
    },
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaders {
    pub count: u32,
    /// Concatenated raw headers.
    pub hex: String,
    pub max: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleOutput {
    pub block_height: u64,
    pub merkle: Vec<String>,
    pub pos: u32,
}

/// `[fee_rate, vsize]` pairs, highest fee rate first.
pub type FeeHistogram = Vec<(f64, u64)>;
