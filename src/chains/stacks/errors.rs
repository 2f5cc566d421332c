//! Errors surfaced by the Stacks blockchain adapter.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StacksError {
    #[error("transaction not found")]
    NotFound,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("request to Stacks API failed: {0}")]
    RequestFailed(String),
    #[error("request to Stacks API timed out")]
    Timeout,
    #[error("invalid Stacks address: {0}")]
    InvalidAddress(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl From<StacksError> for crate::error::AppError {
    fn from(err: StacksError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError};
        let message = err.to_string();
        match err {
            StacksError::NotFound => AppError::new(
                AppErrorKind::Domain(crate::error::DomainError::TransactionNotFound {
                    transaction_id: String::new(),
                }),
                "chain transaction not found",
            ),
            other => AppError::new(
                AppErrorKind::External(ExternalError::Blockchain { message }),
                "blockchain service unavailable",
            )
            .with_status_code(axum::http::StatusCode::BAD_GATEWAY)
            .with_retryable(matches!(other, StacksError::RequestFailed(_) | StacksError::Timeout)),
        }
    }
}
