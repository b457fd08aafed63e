use custody_crypto::{HasherError, KeyFileError};
use custody_store::StoreError;
use custody_types::Digest;
use serde::{Deserialize, Serialize};

/// Errors produced by ledger lifecycle and read operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The persisted log could not be replayed (1-based line number).
    #[error("cannot initialize ledger: line {line}: {reason}")]
    Initialization { line: usize, reason: String },

    #[error("ledger is already initialized")]
    AlreadyInitialized,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("writer key error: {0}")]
    KeyFile(#[from] KeyFileError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("append failed: {0}")]
    Append(#[from] AppendError),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Proof(#[from] ProofVerificationFailure),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

/// Reasons an append was refused. The in-memory chain is unchanged in
/// every case.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("ledger is not initialized")]
    NotInitialized,

    #[error("ledger has been shut down")]
    ShutDown,

    #[error("block could not be persisted after {attempts} attempt(s): {source}")]
    Persistence {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("block could not be encoded: {0}")]
    Serialization(String),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

impl AppendError {
    /// Whether the caller may resubmit the same record.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

impl From<HasherError> for AppendError {
    fn from(err: HasherError) -> Self {
        match err {
            HasherError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}

/// Which chain check a block failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Recomputing the hash does not reproduce the stored hash.
    HashMismatch,
    /// `previousHash` does not equal the predecessor's hash.
    LinkageMismatch,
    /// `index` does not equal the block's position in the chain.
    IndexMismatch,
    /// The signature does not verify under the writer's key.
    SignatureInvalid,
}

/// The first block that failed chain validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("chain broken at block {index} ({kind:?}): {detail}")]
pub struct ValidationFailure {
    /// Position of the failing block in the chain.
    pub index: u64,
    pub kind: FailureKind,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProofVerificationFailure {
    #[error("no block with hash {0}")]
    UnknownHash(Digest),

    #[error("inclusion proof for block {index} does not reproduce its merkle root")]
    ProofMismatch { index: u64 },
}
