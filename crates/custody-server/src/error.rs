use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use custody_ledger::{AppendError, LedgerError, ProofVerificationFailure};
use custody_types::TypeError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] TypeError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Append(#[from] AppendError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRecord(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Append(AppendError::NotInitialized | AppendError::ShutDown)
            | Self::Append(AppendError::Persistence { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Ledger(LedgerError::Proof(ProofVerificationFailure::UnknownHash(_))) => {
                StatusCode::NOT_FOUND
            }
            Self::Ledger(LedgerError::Proof(ProofVerificationFailure::ProofMismatch { .. })) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
