use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use custody_types::Block;

use crate::error::{StoreError, StoreResult};
use crate::traits::{decode_line, encode_line, BlockStore};

#[derive(Default)]
struct MemoryLog {
    lines: Vec<String>,
    /// Number of upcoming `persist_block` calls that fail with a transient error.
    pending_failures: u32,
}

/// In-memory block log holding the same NDJSON lines the file store writes.
///
/// Cloning shares the underlying log, so a test can keep a handle after
/// handing the store to a ledger, then inspect or tamper with the lines.
#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryBlockStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with raw lines (without newlines).
    pub fn from_lines(lines: impl IntoIterator<Item = String>) -> Self {
        let store = Self::new();
        store.state().lines = lines.into_iter().collect();
        store
    }

    /// Snapshot of the persisted lines.
    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    /// Number of persisted lines.
    pub fn len(&self) -> usize {
        self.state().lines.len()
    }

    /// Returns `true` if nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.state().lines.is_empty()
    }

    /// Overwrite one persisted line in place. Returns `false` if out of range.
    pub fn replace_line(&self, index: usize, line: String) -> bool {
        match self.state().lines.get_mut(index) {
            Some(slot) => {
                *slot = line;
                true
            }
            None => false,
        }
    }

    /// Make the next `count` writes fail with a transient I/O error.
    pub fn fail_next_writes(&self, count: u32) {
        self.state().pending_failures = count;
    }

    // The log holds plain data with no cross-field invariant, so a poisoned
    // lock is still safe to read.
    fn state(&self) -> MutexGuard<'_, MemoryLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlockStore for MemoryBlockStore {
    fn load(&mut self) -> StoreResult<Vec<Block>> {
        self.state()
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| decode_line(line, i + 1))
            .collect()
    }

    fn persist_block(&mut self, block: &Block) -> StoreResult<()> {
        let mut line = encode_line(block)?;
        line.pop();
        let line = String::from_utf8(line).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut log = self.state();
        if log.pending_failures > 0 {
            log.pending_failures -= 1;
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Interrupted,
                "injected write failure",
            )));
        }
        log.lines.push(line);
        Ok(())
    }

    fn storage_bytes(&self) -> StoreResult<u64> {
        Ok(self
            .state()
            .lines
            .iter()
            .map(|line| line.len() as u64 + 1)
            .sum())
    }

    fn sync(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
