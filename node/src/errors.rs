// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use canon_kernel::{ChainSummary, KernelError};
use canon_persistence::PersistenceError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Chain {} is already sealed", .0.id)]
    AlreadySealed(Box<ChainSummary>),
    #[error("Event {0} is already in the chain")]
    DuplicateEvent(canon_kernel::EventId),
    #[error("Not owner: {0}")]
    NotOwner(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Storage timed out")]
    StorageTimeout,
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Enrichment failed: {0}")]
    Enrichment(String),
}

impl LedgerError {
    /// Transient storage failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Storage(_) | LedgerError::StorageTimeout)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::AlreadySealed(_) | LedgerError::DuplicateEvent(_) => StatusCode::CONFLICT,
            LedgerError::NotOwner(_) => StatusCode::FORBIDDEN,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Storage(_) | LedgerError::Enrichment(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerError::StorageTimeout => StatusCode::SERVICE_UNAVAILABLE,
            // Client closed request (nginx convention).
            LedgerError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            LedgerError::AlreadySealed(summary) => Json(json!({
                "error": self.to_string(),
                "chain": summary,
            })),
            _ => Json(json!({
                "error": self.to_string()
            })),
        };

        (status, body).into_response()
    }
}

impl From<KernelError> for LedgerError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::Validation(msg) => LedgerError::Validation(msg),
            KernelError::DuplicateEvent(id) => LedgerError::DuplicateEvent(id),
            KernelError::NotOwner { .. } => LedgerError::NotOwner(e.to_string()),
            KernelError::EventNotFound(_)
            | KernelError::StorylineNotFound(_)
            | KernelError::ChainNotFound(_) => LedgerError::NotFound(e.to_string()),
            // Callers holding the chain map this to `AlreadySealed` with a summary.
            KernelError::AlreadySealed(_) | KernelError::Invariant(_) => LedgerError::Storage(e.to_string()),
        }
    }
}

impl From<PersistenceError> for LedgerError {
    fn from(e: PersistenceError) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
