use custody_crypto::{verify_proof, MerkleTree, ProofStep};
use custody_types::{Block, ChainOfCustody, Digest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LedgerError, ProofVerificationFailure};
use crate::traits::LedgerReader;

/// Merkle inclusion proof of one block within the window recorded when it
/// was appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionProof {
    pub block_index: u64,
    pub block_hash: Digest,
    /// The block's recorded root, which the path must reproduce.
    pub merkle_root: Digest,
    /// Chain position of the first hash in the window.
    pub window_start: u64,
    pub window_len: usize,
    pub path: Vec<ProofStep>,
    pub verified: bool,
}

impl InclusionProof {
    /// Re-run the fold against the recorded root.
    pub fn recheck(&self) -> bool {
        verify_proof(&self.block_hash, &self.path, &self.merkle_root)
    }
}

/// Custody metadata of one audited block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodyEntry {
    pub block_index: u64,
    pub timestamp: u64,
    pub record_type: String,
    #[serde(flatten)]
    pub custody: ChainOfCustody,
}

/// Every block recorded for a session or analysis, with proofs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    pub session_id: String,
    pub blocks: Vec<Block>,
    pub merkle_proof: Vec<InclusionProof>,
    pub chain_of_custody: Vec<CustodyEntry>,
    /// `true` only when at least one block matched and every proof verified.
    pub verified: bool,
}

/// Builds audit trails and inclusion proofs from a ledger snapshot.
pub struct AuditService<'a, R> {
    reader: &'a R,
    merkle_window: usize,
}

impl<'a, R: LedgerReader> AuditService<'a, R> {
    /// `merkle_window` must match the window the ledger appends with.
    pub fn new(reader: &'a R, merkle_window: usize) -> Self {
        Self {
            reader,
            merkle_window: merkle_window.max(1),
        }
    }

    /// Blocks whose session or analysis id equals `id`, in chain order.
    /// No match yields an empty, unverified trail rather than an error.
    pub fn audit_trail(&self, id: &str) -> Result<AuditTrail, LedgerError> {
        let chain = self.reader.read_all()?;

        let mut blocks = Vec::new();
        let mut proofs = Vec::new();
        let mut custody = Vec::new();
        for (position, block) in chain.iter().enumerate() {
            if !block.data.matches_session(id) {
                continue;
            }
            let start = self.window_start(position);
            let proof = prove_last(&chain[start..=position], start);
            if !proof.verified {
                warn!(index = block.index, hash = %block.hash, "audit proof does not verify");
            }
            proofs.push(proof);
            custody.push(CustodyEntry {
                block_index: block.index,
                timestamp: block.timestamp,
                record_type: block.data.payload.record_type().to_string(),
                custody: block.data.custody.clone(),
            });
            blocks.push(block.clone());
        }

        let verified = !proofs.is_empty() && proofs.iter().all(|p| p.verified);
        debug!(session = id, blocks = blocks.len(), verified, "built audit trail");
        Ok(AuditTrail {
            session_id: id.to_string(),
            blocks,
            merkle_proof: proofs,
            chain_of_custody: custody,
            verified,
        })
    }

    /// Inclusion proof for the block with `hash`, checked against its root.
    pub fn prove_block(&self, hash: &Digest) -> Result<InclusionProof, LedgerError> {
        let position = self
            .reader
            .position_of(hash)?
            .ok_or(ProofVerificationFailure::UnknownHash(*hash))?;
        let start = self.window_start(position);
        let window = self.reader.read_range(start, position - start + 1)?;
        if window.last().map(|b| b.hash) != Some(*hash) {
            return Err(ProofVerificationFailure::UnknownHash(*hash).into());
        }

        let proof = prove_last(&window, start);
        if !proof.verified {
            return Err(ProofVerificationFailure::ProofMismatch {
                index: proof.block_index,
            }
            .into());
        }
        Ok(proof)
    }

    fn window_start(&self, position: usize) -> usize {
        (position + 1).saturating_sub(self.merkle_window)
    }
}

/// Prove the last block of a non-empty `window` starting at chain position `start`.
fn prove_last(window: &[Block], start: usize) -> InclusionProof {
    let leaves: Vec<Digest> = window.iter().map(|b| b.hash).collect();
    let target = &window[window.len() - 1];
    let path = MerkleTree::from_leaves(leaves)
        .proof(window.len() - 1)
        .map(|p| p.path)
        .unwrap_or_default();
    let verified = verify_proof(&target.hash, &path, &target.merkle_root);

    InclusionProof {
        block_index: target.index,
        block_hash: target.hash,
        merkle_root: target.merkle_root,
        window_start: start as u64,
        window_len: window.len(),
        path,
        verified,
    }
}
