use custody_types::{Block, BlockHeader, Digest};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a block header and an arbitrary blob with identical bytes
/// never share a digest.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for canonical block headers.
    pub const BLOCK: Self = Self {
        domain: "custody-block-v1",
    };
    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a serializable value as JSON with domain separation.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<Digest, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Hash of `{index, timestamp, data, previousHash, nonce}`.
    pub fn hash_header(header: &BlockHeader<'_>) -> Result<Digest, HasherError> {
        Self::BLOCK.hash_json(header)
    }

    /// Recompute a block's hash from its fields, ignoring the stored hash.
    pub fn recompute_block_hash(block: &Block) -> Result<Digest, HasherError> {
        Self::hash_header(&block.header())
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
