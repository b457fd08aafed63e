//! Cryptographic primitives for the custody ledger.
//!
//! Provides domain-separated BLAKE3 hashing of canonical block headers,
//! binary Merkle trees with inclusion proofs, and Ed25519 block signing.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod hasher;
pub mod merkle;
pub mod signer;

pub use hasher::{ContentHasher, HasherError};
pub use merkle::{compute_root, generate_proof, verify_proof, MerkleProof, MerkleTree, ProofStep, Side};
pub use signer::{KeyFileError, Signature, SignatureError, SigningKey, VerifyingKey};
