use custody_types::{Block, BlockData, Digest};

use crate::error::{AppendError, LedgerError};

/// Write boundary for ledger append operations.
pub trait LedgerWriter: Send + Sync {
    /// Build, persist, and publish the next block carrying `data`.
    fn append(&self, data: BlockData) -> Result<Block, AppendError>;
}

/// Read boundary for ledger queries. Every call observes a consistent
/// snapshot; a block is visible only once it is durable.
pub trait LedgerReader: Send + Sync {
    fn block_count(&self) -> Result<usize, LedgerError>;

    fn tip(&self) -> Result<Option<Block>, LedgerError>;

    fn get_by_hash(&self, hash: &Digest) -> Result<Option<Block>, LedgerError>;

    /// Chain position of the block with `hash`.
    fn position_of(&self, hash: &Digest) -> Result<Option<usize>, LedgerError>;

    /// Up to `limit` blocks starting at position `offset`.
    fn read_range(&self, offset: usize, limit: usize) -> Result<Vec<Block>, LedgerError>;

    fn read_all(&self) -> Result<Vec<Block>, LedgerError>;
}
