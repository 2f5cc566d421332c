//! Errors surfaced by the payout provider adapter (C3).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("bank verification failed: {0}")]
    BankVerificationFailed(String),
    #[error("payout failed: {0}")]
    PayoutFailed(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, InfrastructureError};
        match err {
            PaymentError::BankVerificationFailed(message) => AppError::new(
                AppErrorKind::External(ExternalError::BankVerificationFailed { message: message.clone() }),
                message,
            ),
            PaymentError::PayoutFailed(message) => AppError::new(
                AppErrorKind::External(ExternalError::PayoutFailed { message: message.clone() }),
                message,
            )
            .with_retryable(false),
            PaymentError::Network(message) => AppError::new(
                AppErrorKind::External(ExternalError::Upstream { service: "lenco".to_string(), message }),
                "payout provider unavailable",
            )
            .with_retryable(true),
            PaymentError::Timeout => AppError::new(
                AppErrorKind::External(ExternalError::Timeout { service: "lenco".to_string(), timeout_secs: 30 }),
                "payout provider timed out",
            )
            .with_retryable(true),
            PaymentError::InvalidSignature => AppError::new(
                AppErrorKind::External(ExternalError::Upstream {
                    service: "lenco".to_string(),
                    message: "invalid webhook signature".to_string(),
                }),
                "invalid webhook signature",
            )
            .with_status_code(axum::http::StatusCode::UNAUTHORIZED),
            PaymentError::NotConfigured(variable) => AppError::new(
                AppErrorKind::Infrastructure(InfrastructureError::ConfigMissing { variable }),
                "payout provider is not configured",
            )
            .with_status_code(axum::http::StatusCode::SERVICE_UNAVAILABLE),
            PaymentError::Decode(message) => AppError::new(
                AppErrorKind::External(ExternalError::Upstream { service: "lenco".to_string(), message }),
                "payout provider returned an unexpected response",
            ),
        }
    }
}
