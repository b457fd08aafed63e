//! Append-only, tamper-evident custody ledger.
//!
//! This crate is the heart of the workspace. It provides:
//! - [`Ledger`]: initialize / append / shutdown over any [`BlockStore`](custody_store::BlockStore)
//! - `LedgerWriter` / `LedgerReader` trait boundaries
//! - Replay of the block log into an in-memory chain and hash index
//! - Chain validation (hash, linkage, index, signatures)
//! - Audit trails with Merkle inclusion proofs over each block's window

pub mod audit;
pub mod config;
pub mod error;
pub mod index;
pub mod ledger;
pub mod traits;
pub mod validation;

pub use audit::{AuditService, AuditTrail, CustodyEntry, InclusionProof};
pub use config::LedgerConfig;
pub use error::{AppendError, FailureKind, LedgerError, ProofVerificationFailure, ValidationFailure};
pub use index::LedgerIndex;
pub use ledger::{Ledger, LedgerSize};
pub use traits::{LedgerReader, LedgerWriter};
pub use validation::{ChainValidator, ValidationReport};
