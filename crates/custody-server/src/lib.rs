//! HTTP server for the custody ledger.
//!
//! Accepts finding records, serves audit trails and inclusion proofs, and
//! reports chain health over a small JSON API.

pub mod api;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use api::{AppendResponse, ChainPage, HealthResponse, PublicKeyResponse};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::CustodyServer;
