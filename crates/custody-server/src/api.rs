//! Wire types for the HTTP API.

use custody_ledger::ValidationReport;
use custody_types::{Block, Digest};
use serde::{Deserialize, Serialize};

/// HTTP endpoint paths.
pub mod endpoints {
    pub const HEALTH: &str = "/v1/health";
    pub const RECORDS: &str = "/v1/records";
    pub const AUDIT: &str = "/v1/audit/:id";
    pub const PROOF: &str = "/v1/proof/:hash";
    pub const CHAIN: &str = "/v1/chain";
    pub const PUBKEY: &str = "/v1/pubkey";
}

/// Reply to an accepted record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponse {
    pub block_hash: Digest,
    pub block_index: u64,
    pub timestamp: u64,
}

impl From<&Block> for AppendResponse {
    fn from(block: &Block) -> Self {
        Self {
            block_hash: block.hash,
            block_index: block.index,
            timestamp: block.timestamp,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageParams {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainPage {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` for an intact chain, `"degraded"` once validation fails.
    pub status: String,
    pub version: String,
    pub block_count: u64,
    pub storage_bytes: u64,
    pub last_block_timestamp: Option<u64>,
    pub validation: ValidationReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub algorithm: String,
    pub public_key: String,
}
