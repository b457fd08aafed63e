use std::collections::HashMap;

use custody_types::{Block, Digest};

/// In-memory `hash → position` lookup, rebuilt from the chain on start.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerIndex {
    positions: HashMap<Digest, usize>,
}

/// Two blocks in a replayed chain share a hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DuplicateHash {
    pub hash: Digest,
    /// Position of the second occurrence.
    pub position: usize,
}

impl LedgerIndex {
    /// Index every block of `chain` by its stored hash.
    pub fn rebuild(chain: &[Block]) -> Result<Self, DuplicateHash> {
        let mut index = Self {
            positions: HashMap::with_capacity(chain.len()),
        };
        for (position, block) in chain.iter().enumerate() {
            if !index.insert(block.hash, position) {
                return Err(DuplicateHash {
                    hash: block.hash,
                    position,
                });
            }
        }
        Ok(index)
    }

    /// Record `hash` at `position`. Returns `false` if the hash is already known.
    pub fn insert(&mut self, hash: Digest, position: usize) -> bool {
        match self.positions.entry(hash) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(position);
                true
            }
        }
    }

    pub fn position(&self, hash: &Digest) -> Option<usize> {
        self.positions.get(hash).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
