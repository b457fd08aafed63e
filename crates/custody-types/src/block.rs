use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::payload::BlockData;

/// Wire value of `previousHash` on the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// One immutable, hash-linked ledger record.
///
/// `hash` covers [`BlockHeader`] only; `signature` and `merkle_root` are
/// derived from `hash` and therefore excluded from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain, 0 for genesis.
    pub index: u64,
    /// Creation time in milliseconds since the UNIX epoch.
    pub timestamp: u64,
    pub data: BlockData,
    /// Hash of the preceding block; `None` (serialized `"0"`) for genesis.
    #[serde(with = "previous_hash_serde")]
    pub previous_hash: Option<Digest>,
    pub hash: Digest,
    /// Reserved for proof-of-work; always 0.
    pub nonce: u64,
    /// Hex-encoded signature over `hash`.
    pub signature: String,
    /// Merkle root over the trailing window of block hashes ending here.
    pub merkle_root: Digest,
}

impl Block {
    /// The hashed portion of the block.
    pub fn header(&self) -> BlockHeader<'_> {
        BlockHeader {
            index: self.index,
            timestamp: self.timestamp,
            data: &self.data,
            previous_hash: self.previous_hash,
            nonce: self.nonce,
        }
    }

    /// Returns `true` for the first block of a chain.
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash.is_none()
    }
}

/// Canonical hash input: `{index, timestamp, data, previousHash, nonce}`.
///
/// Field order is fixed by declaration order, and every map inside `data` is
/// ordered, so two semantically identical blocks always encode identically.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader<'a> {
    pub index: u64,
    pub timestamp: u64,
    pub data: &'a BlockData,
    #[serde(with = "previous_hash_serde")]
    pub previous_hash: Option<Digest>,
    pub nonce: u64,
}

mod previous_hash_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::GENESIS_PREVIOUS_HASH;
    use crate::digest::Digest;

    pub fn serialize<S>(prev: &Option<Digest>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match prev {
            Some(digest) => serializer.serialize_str(&digest.to_hex()),
            None => serializer.serialize_str(GENESIS_PREVIOUS_HASH),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Digest>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == GENESIS_PREVIOUS_HASH {
            return Ok(None);
        }
        Digest::from_hex(&s)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: u64, previous_hash: Option<Digest>) -> Block {
        Block {
            index,
            timestamp: 1_700_000_000_000,
            data: BlockData::genesis("0.1.0"),
            previous_hash,
            hash: Digest::of(&index.to_le_bytes()),
            nonce: 0,
            signature: "00".repeat(64),
            merkle_root: Digest::of(b"root"),
        }
    }

    #[test]
    fn genesis_previous_hash_serializes_as_zero() {
        let value = serde_json::to_value(block(0, None)).unwrap();
        assert_eq!(value["previousHash"], "0");
        assert_eq!(value["merkleRoot"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn linked_block_roundtrip() {
        let b = block(3, Some(Digest::of(b"prev")));
        let line = serde_json::to_string(&b).unwrap();
        let parsed: Block = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, b);
        assert!(!parsed.is_genesis());
    }

    #[test]
    fn malformed_previous_hash_is_rejected() {
        let mut value = serde_json::to_value(block(1, Some(Digest::of(b"p")))).unwrap();
        value["previousHash"] = "not-hex".into();
        assert!(serde_json::from_value::<Block>(value).is_err());
    }

    #[test]
    fn header_excludes_derived_fields() {
        let b = block(2, Some(Digest::of(b"p")));
        let header = serde_json::to_value(b.header()).unwrap();
        let keys: Vec<&str> = header
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            keys,
            vec!["data", "index", "nonce", "previousHash", "timestamp"]
        );
    }
}
