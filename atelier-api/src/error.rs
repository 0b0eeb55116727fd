//! API error types
//!
//! Maps every engine error to a distinct `(status code, machine-readable
//! code)` pair so callers can tell "no longer available" apart from
//! "network error, retry".

use atelier_core::CoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Status and code for an engine error
///
/// `ConfirmationTimeout` maps to 202: the purchase is still pending and the
/// caller should poll its status while reconciliation resolves it.
fn core_error_mapping(e: &CoreError) -> (StatusCode, &'static str) {
    match e {
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        CoreError::OutOfStock { .. } => (StatusCode::CONFLICT, "OUT_OF_STOCK"),
        CoreError::ReservationExpired(_) => (StatusCode::GONE, "RESERVATION_EXPIRED"),
        CoreError::Ownership { .. } => (StatusCode::FORBIDDEN, "NOT_OWNER"),
        CoreError::TransactionBuild(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "TRANSACTION_BUILD_FAILED")
        }
        CoreError::Simulation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "SIMULATION_FAILED"),
        CoreError::Broadcast(_) => (StatusCode::BAD_GATEWAY, "BROADCAST_FAILED"),
        CoreError::ConfirmationTimeout { .. } => (StatusCode::ACCEPTED, "CONFIRMATION_PENDING"),
        CoreError::DuplicateSignature { .. } => (StatusCode::CONFLICT, "DUPLICATE_SIGNATURE"),
        CoreError::RetryExhausted { .. } => (StatusCode::BAD_GATEWAY, "RETRY_EXHAUSTED"),
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        CoreError::Rpc(_) => (StatusCode::BAD_GATEWAY, "LEDGER_RPC_ERROR"),
        CoreError::RpcResponse { .. } => (StatusCode::BAD_GATEWAY, "LEDGER_RPC_REJECTED"),
        CoreError::Signer(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SIGNER_ERROR"),
        CoreError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        CoreError::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
        CoreError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR"),
        CoreError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
            ApiError::Core(e) => {
                let (status, code) = core_error_mapping(e);
                (status, code, e.to_string())
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;
