//! Append-only block storage for the custody ledger.
//!
//! The persisted format is newline-delimited JSON: one fully serialized
//! [`Block`](custody_types::Block) per line, UTF-8, line order = chain order.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlockStore`] trait:
//!
//! - [`FileBlockStore`] -- NDJSON file, fsync per write unless configured otherwise
//! - [`MemoryBlockStore`] -- shared in-memory lines for tests and embedding
//!
//! # Design Rules
//!
//! 1. Writes only ever append; prior lines are never rewritten.
//! 2. A failed write trims its own torn bytes and nothing else; if the trim
//!    fails the store refuses further writes.
//! 3. One writer per log file, enforced with an advisory lock.
//! 4. Replay fails on the first unreadable line and names it.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod retry;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::{FileBlockStore, SyncMode};
pub use memory::MemoryBlockStore;
pub use retry::{RetryExhausted, RetryPolicy};
pub use traits::BlockStore;
