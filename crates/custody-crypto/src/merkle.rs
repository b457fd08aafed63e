use custody_types::Digest;
use serde::{Deserialize, Serialize};

/// Side of a sibling in a Merkle proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One level of an inclusion proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Digest,
    pub side: Side,
}

/// Binary Merkle tree over an ordered window of block hashes.
///
/// Odd levels pair their last node with itself instead of dropping it.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// Level 0 = leaves, last level = root. Empty for an empty tree.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a Merkle tree from leaf digests.
    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        if leaves.is_empty() {
            return Self { levels: vec![] };
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two elements"),
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    /// The root hash, or `None` for an empty tree. A single leaf is its own root.
    pub fn root(&self) -> Option<Digest> {
        self.levels.last().map(|level| level[0])
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let root = self.root()?;
        let leaf = *self.levels[0].get(index)?;

        let mut path = Vec::with_capacity(self.levels.len() - 1);
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling_idx, side) = if idx % 2 == 0 {
                (idx + 1, Side::Right)
            } else {
                (idx - 1, Side::Left)
            };
            // Odd level: the last node is paired with itself.
            let sibling = level.get(sibling_idx).copied().unwrap_or(level[idx]);
            path.push(ProofStep { sibling, side });
            idx /= 2;
        }

        Some(MerkleProof { leaf, path, root })
    }

    /// Generate an inclusion proof for the first leaf equal to `leaf`.
    pub fn proof_for(&self, leaf: &Digest) -> Option<MerkleProof> {
        let index = self.levels.first()?.iter().position(|l| l == leaf)?;
        self.proof(index)
    }
}

/// Merkle inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The leaf being proven.
    pub leaf: Digest,
    /// Sibling path from leaf to root.
    pub path: Vec<ProofStep>,
    /// Expected root hash.
    pub root: Digest,
}

impl MerkleProof {
    /// Verify the proof: recompute the root from the leaf and path.
    pub fn verify(&self) -> bool {
        verify_proof(&self.leaf, &self.path, &self.root)
    }
}

/// Root of the pairwise fold over `hashes`, or `None` when empty.
pub fn compute_root(hashes: &[Digest]) -> Option<Digest> {
    MerkleTree::from_leaves(hashes.to_vec()).root()
}

/// Inclusion proof for `target` within `window`, or `None` if absent.
pub fn generate_proof(window: &[Digest], target: &Digest) -> Option<MerkleProof> {
    MerkleTree::from_leaves(window.to_vec()).proof_for(target)
}

/// Fold `target` with each sibling in order and compare to `expected_root`.
pub fn verify_proof(target: &Digest, path: &[ProofStep], expected_root: &Digest) -> bool {
    let computed = path.iter().fold(*target, |current, step| match step.side {
        Side::Left => hash_pair(&step.sibling, &current),
        Side::Right => hash_pair(&current, &step.sibling),
    });
    computed == *expected_root
}

fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"custody-merkle-v1:");
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest::from_hash(*hasher.finalize().as_bytes())
}
