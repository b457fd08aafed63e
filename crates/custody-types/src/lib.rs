//! Foundation types for the custody ledger.
//!
//! This crate provides the record and identifier types shared by every other
//! custody crate. It performs no I/O and no signing.
//!
//! # Key Types
//!
//! - [`Digest`] -- 256-bit hash rendered as lowercase hex
//! - [`Block`] -- one immutable, hash-linked ledger record
//! - [`BlockData`] -- tagged [`Payload`] plus [`ChainOfCustody`] metadata
//! - [`RecordSubmission`] -- untrusted caller input, validated into [`BlockData`]

pub mod block;
pub mod digest;
pub mod error;
pub mod payload;
pub mod submission;
pub mod time;

pub use block::{Block, BlockHeader, GENESIS_PREVIOUS_HASH};
pub use digest::Digest;
pub use error::TypeError;
pub use payload::{BlockData, ChainOfCustody, Payload};
pub use submission::{CustodyDefaults, RecordSubmission, POLICY_FINDING_TYPE};
pub use time::now_millis;
