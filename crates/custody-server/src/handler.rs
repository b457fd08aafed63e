use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use custody_ledger::{AuditTrail, InclusionProof, Ledger, LedgerReader, LedgerWriter};
use custody_types::{CustodyDefaults, Digest, RecordSubmission};
use tracing::info;

use crate::api::{AppendResponse, ChainPage, HealthResponse, PageParams, PublicKeyResponse};
use crate::error::{ServerError, ServerResult};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            default_page_size: 100,
            max_page_size: 1000,
        }
    }
}

/// Run ledger work off the async executor.
async fn blocking<T, F>(work: F) -> ServerResult<T>
where
    F: FnOnce() -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
}

pub async fn health_handler(State(state): State<AppState>) -> ServerResult<Json<HealthResponse>> {
    let ledger = state.ledger;
    blocking(move || {
        let size = ledger.size()?;
        let last_block_timestamp = ledger.tip()?.map(|b| b.timestamp);
        let validation = ledger.validate()?;
        Ok(Json(HealthResponse {
            status: if validation.valid { "ok" } else { "degraded" }.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            block_count: size.block_count,
            storage_bytes: size.storage_bytes,
            last_block_timestamp,
            validation,
        }))
    })
    .await
}

pub async fn submit_record_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<AppendResponse>)> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("body is not valid JSON: {e}")))?;
    let defaults = match peer {
        Some(ConnectInfo(addr)) => CustodyDefaults::for_origin(addr.to_string()),
        None => CustodyDefaults::default(),
    };
    let data = RecordSubmission::from_value(value)?.into_block_data(&defaults)?;

    let ledger = state.ledger;
    let block = blocking(move || Ok(ledger.append(data)?)).await?;
    info!(
        index = block.index,
        hash = %block.hash,
        record_type = block.data.payload.record_type(),
        "record accepted"
    );
    Ok((StatusCode::CREATED, Json(AppendResponse::from(&block))))
}

pub async fn audit_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<AuditTrail>> {
    let ledger = state.ledger;
    blocking(move || Ok(Json(ledger.audit_trail(&id)?))).await
}

pub async fn proof_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ServerResult<Json<InclusionProof>> {
    let hash = Digest::from_hex(&hash).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let ledger = state.ledger;
    blocking(move || Ok(Json(ledger.prove_block(&hash)?))).await
}

pub async fn chain_handler(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ServerResult<Json<ChainPage>> {
    let offset = params.offset.unwrap_or(0);
    let limit = params
        .limit
        .unwrap_or(state.default_page_size)
        .min(state.max_page_size);

    let ledger = state.ledger;
    blocking(move || {
        let total = ledger.block_count()?;
        let blocks = ledger.read_range(offset, limit)?;
        Ok(Json(ChainPage {
            total,
            offset,
            limit,
            blocks,
        }))
    })
    .await
}

pub async fn pubkey_handler(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        algorithm: "ed25519".into(),
        public_key: state.ledger.verifying_key().to_hex(),
    })
}
