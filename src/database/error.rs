//! Errors surfaced by the transaction store (C2).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};
        match err {
            DatabaseError::NotFound => AppError::new(
                AppErrorKind::Domain(DomainError::TransactionNotFound {
                    transaction_id: String::new(),
                }),
                "record not found",
            ),
            DatabaseError::Conflict(reason) => AppError::new(
                AppErrorKind::Domain(DomainError::ConflictOfState {
                    reference: String::new(),
                    current_status: String::new(),
                    reason,
                }),
                "conflicting state",
            ),
            DatabaseError::Sqlx(e) => {
                let retryable = !matches!(e, sqlx::Error::RowNotFound);
                AppError::new(
                    AppErrorKind::Infrastructure(InfrastructureError::Database {
                        message: e.to_string(),
                        is_retryable: retryable,
                    }),
                    "a database error occurred",
                )
                .with_retryable(retryable)
            }
        }
    }
}
