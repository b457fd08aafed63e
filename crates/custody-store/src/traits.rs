use custody_types::Block;

use crate::error::{StoreError, StoreResult};

/// Append-only persistent backing store for ledger blocks.
///
/// All implementations must satisfy these invariants:
/// - `persist_block` appends exactly one record and never rewrites prior ones.
/// - `persist_block` returns `Ok` only once the record is written (and
///   synced, if the backend is configured to sync).
/// - A failed `persist_block` leaves the log as it was before the call.
/// - `load` returns blocks in write order and fails on the first record it
///   cannot decode, naming its 1-based line.
pub trait BlockStore: Send {
    /// Replay every persisted block in log order. Empty when nothing is stored.
    fn load(&mut self) -> StoreResult<Vec<Block>>;

    /// Durably append one block.
    fn persist_block(&mut self, block: &Block) -> StoreResult<()>;

    /// Bytes currently held by the backing store.
    fn storage_bytes(&self) -> StoreResult<u64>;

    /// Flush and sync everything written so far.
    fn sync(&mut self) -> StoreResult<()>;

    /// Human-readable location, used in log messages.
    fn describe(&self) -> String;
}

/// Encode a block as one NDJSON line, including the trailing newline.
pub(crate) fn encode_line(block: &Block) -> StoreResult<Vec<u8>> {
    let mut line =
        serde_json::to_vec(block).map_err(|e| StoreError::Serialization(e.to_string()))?;
    line.push(b'\n');
    Ok(line)
}

/// Decode one NDJSON line (without its newline) at 1-based `line_no`.
pub(crate) fn decode_line(line: &str, line_no: usize) -> StoreResult<Block> {
    serde_json::from_str(line).map_err(|e| StoreError::CorruptLine {
        line: line_no,
        reason: e.to_string(),
    })
}
