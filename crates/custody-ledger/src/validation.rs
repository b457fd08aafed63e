use custody_crypto::{ContentHasher, VerifyingKey};
use custody_types::Block;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FailureKind, ValidationFailure};

/// Result of a single validation pass over the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    /// Blocks examined, including the one that failed.
    pub blocks_checked: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_broken_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationReport {
    fn passed(blocks_checked: u64) -> Self {
        Self {
            valid: true,
            blocks_checked,
            first_broken_index: None,
            kind: None,
            reason: None,
        }
    }

    fn failed(blocks_checked: u64, failure: ValidationFailure) -> Self {
        Self {
            valid: false,
            blocks_checked,
            first_broken_index: Some(failure.index),
            kind: Some(failure.kind),
            reason: Some(failure.detail),
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<ValidationFailure> {
        Some(ValidationFailure {
            index: self.first_broken_index?,
            kind: self.kind?,
            detail: self.reason.clone().unwrap_or_default(),
        })
    }

    /// `Ok(blocks_checked)` for a valid chain, the first failure otherwise.
    pub fn into_result(self) -> Result<u64, ValidationFailure> {
        match self.failure() {
            Some(failure) => Err(failure),
            None => Ok(self.blocks_checked),
        }
    }
}

/// Hash-chain integrity validator.
///
/// For each block in order: the stored hash must recompute, `previousHash`
/// must equal the predecessor's hash (`None` for genesis), and `index` must
/// equal the block's position. With a key, the signature must verify too.
/// Validation stops at the first failing block.
pub struct ChainValidator;

impl ChainValidator {
    pub fn validate(chain: &[Block]) -> ValidationReport {
        Self::run(chain, None)
    }

    /// Like [`validate`](Self::validate), also checking every signature.
    pub fn validate_with_key(chain: &[Block], key: &VerifyingKey) -> ValidationReport {
        Self::run(chain, Some(key))
    }

    fn run(chain: &[Block], key: Option<&VerifyingKey>) -> ValidationReport {
        for (position, block) in chain.iter().enumerate() {
            let predecessor = position.checked_sub(1).map(|p| &chain[p]);
            if let Err(failure) = check_block(position as u64, block, predecessor, key) {
                warn!(
                    index = failure.index,
                    kind = ?failure.kind,
                    detail = %failure.detail,
                    "chain validation failed"
                );
                return ValidationReport::failed(position as u64 + 1, failure);
            }
        }
        ValidationReport::passed(chain.len() as u64)
    }
}

fn check_block(
    position: u64,
    block: &Block,
    predecessor: Option<&Block>,
    key: Option<&VerifyingKey>,
) -> Result<(), ValidationFailure> {
    let fail = |kind, detail: String| ValidationFailure {
        index: position,
        kind,
        detail,
    };

    let computed = ContentHasher::recompute_block_hash(block)
        .map_err(|e| fail(FailureKind::HashMismatch, e.to_string()))?;
    if computed != block.hash {
        return Err(fail(
            FailureKind::HashMismatch,
            format!("stored hash {} but contents hash to {}", block.hash, computed),
        ));
    }

    let expected_prev = predecessor.map(|p| p.hash);
    if block.previous_hash != expected_prev {
        let render = |d: Option<custody_types::Digest>| {
            d.map_or_else(|| custody_types::GENESIS_PREVIOUS_HASH.to_string(), |d| d.to_hex())
        };
        return Err(fail(
            FailureKind::LinkageMismatch,
            format!(
                "previousHash is {} but predecessor hash is {}",
                render(block.previous_hash),
                render(expected_prev)
            ),
        ));
    }

    if block.index != position {
        return Err(fail(
            FailureKind::IndexMismatch,
            format!("block at position {position} carries index {}", block.index),
        ));
    }

    if let Some(key) = key {
        key.verify_block(block)
            .map_err(|e| fail(FailureKind::SignatureInvalid, e.to_string()))?;
    }

    Ok(())
}
