//! Closed error taxonomy for the engine, mapped to the HTTP boundary via
//! `utils::response::AppError`.

use axum::http::StatusCode;

use crate::utils::response::AppError;

/// Errors the engine's core components can raise.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("risk check rejected order: {0}")]
    RiskRejected(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => AppError::new(StatusCode::BAD_REQUEST, "VALIDATION", &msg),
            EngineError::RiskRejected(msg) => {
                AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "RISK_REJECTED", &msg)
            }
            EngineError::Unauthorized(msg) => AppError::unauthorized(&msg),
            EngineError::Conflict(msg) => AppError::new(StatusCode::CONFLICT, "CONFLICT", &msg),
            EngineError::StoreUnavailable(msg) => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", &msg)
            }
            EngineError::InvariantViolation(msg) => AppError::internal(&msg),
            EngineError::NotFound(msg) => AppError::not_found(&msg),
        }
    }
}

/// Errors surfaced by the state store abstraction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("script execution failed: {0}")]
    ScriptFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::ScriptFailed(msg) => EngineError::InvariantViolation(msg),
            StoreError::Serialization(msg) => EngineError::InvariantViolation(msg),
        }
    }
}
