//! Application-wide error taxonomy.
//!
//! Every HTTP handler and service in this crate returns `Result<_, AppError>`.
//! `AppError` carries enough structure to render the exact HTTP status and
//! machine-readable `code` the external interface promises, without forcing
//! every call site to hand-build a response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Machine-readable error code surfaced to API consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InsufficientLiquidity,
    BankVerificationFailed,
    PayoutFailed,
    UpstreamUnavailable,
    AuthFailure,
    NotFound,
    ConflictOfState,
    ConfigMissing,
    InternalError,
}

/// The four error families named in the error handling design.
#[derive(Debug)]
pub enum AppErrorKind {
    Validation(ValidationError),
    Domain(DomainError),
    External(ExternalError),
    Infrastructure(InfrastructureError),
}

#[derive(Debug)]
pub enum ValidationError {
    InvalidAmount { amount: String, reason: String },
    OutOfRange { field: String, min: Option<String>, max: Option<String> },
    InvalidWalletAddress { address: String, reason: String },
    InvalidAccountNumber { account_number: String },
    InvalidCurrency { currency: String, reason: String },
    MissingField { field: String },
}

#[derive(Debug)]
pub enum DomainError {
    TransactionNotFound { transaction_id: String },
    InvalidAmount { amount: String, reason: String },
    InsufficientLiquidity { available_ngn: i64, shortfall_ngn: i64, max_order_ngn: i64 },
    LiquidityUnknown,
    ConflictOfState { reference: String, current_status: String, reason: String },
    AlreadyProcessed { reference: String },
}

#[derive(Debug)]
pub enum ExternalError {
    BankVerificationFailed { message: String },
    PayoutFailed { message: String },
    Timeout { service: String, timeout_secs: u64 },
    Blockchain { message: String },
    Upstream { service: String, message: String },
}

#[derive(Debug)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Cache { message: String },
    ConfigMissing { variable: String },
}

/// A fully-formed application error, ready to become an HTTP response.
#[derive(Debug)]
pub struct AppError {
    kind: AppErrorKind,
    message: String,
    status_code: Option<u16>,
    retryable: bool,
    details: Option<Value>,
}

impl AppError {
    pub fn new(kind: AppErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            retryable: false,
            details: None,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(
            AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: message.into(),
                is_retryable: false,
            }),
            "Internal server error",
        )
    }

    pub fn with_status_code(mut self, status: StatusCode) -> Self {
        self.status_code = Some(status.as_u16());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// HTTP status implied by the error kind, unless overridden.
    pub fn status_code(&self) -> u16 {
        if let Some(code) = self.status_code {
            return code;
        }
        match &self.kind {
            AppErrorKind::Validation(_) => 400,
            AppErrorKind::Domain(domain) => match domain {
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::InsufficientLiquidity { .. } => 503,
                DomainError::LiquidityUnknown => 503,
                DomainError::ConflictOfState { .. } => 400,
                DomainError::AlreadyProcessed { .. } => 200,
                DomainError::InvalidAmount { .. } => 400,
            },
            AppErrorKind::External(ext) => match ext {
                ExternalError::BankVerificationFailed { .. } => 400,
                ExternalError::PayoutFailed { .. } => 500,
                ExternalError::Timeout { .. } => 502,
                ExternalError::Blockchain { .. } => 502,
                ExternalError::Upstream { .. } => 502,
            },
            AppErrorKind::Infrastructure(infra) => match infra {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::Cache { .. } => 500,
                InfrastructureError::ConfigMissing { .. } => 503,
            },
        }
    }

    /// Machine-readable error code.
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
            AppErrorKind::Domain(domain) => match domain {
                DomainError::TransactionNotFound { .. } => ErrorCode::NotFound,
                DomainError::InsufficientLiquidity { .. } => ErrorCode::InsufficientLiquidity,
                DomainError::LiquidityUnknown => ErrorCode::InsufficientLiquidity,
                DomainError::ConflictOfState { .. } => ErrorCode::ConflictOfState,
                DomainError::AlreadyProcessed { .. } => ErrorCode::ConflictOfState,
                DomainError::InvalidAmount { .. } => ErrorCode::ValidationError,
            },
            AppErrorKind::External(ext) => match ext {
                ExternalError::BankVerificationFailed { .. } => ErrorCode::BankVerificationFailed,
                ExternalError::PayoutFailed { .. } => ErrorCode::PayoutFailed,
                _ => ErrorCode::UpstreamUnavailable,
            },
            AppErrorKind::Infrastructure(infra) => match infra {
                InfrastructureError::ConfigMissing { .. } => ErrorCode::ConfigMissing,
                _ => ErrorCode::InternalError,
            },
        }
    }

    /// Message safe to show a caller. In production, opaque 5xx messages are
    /// generic; everything else surfaces the constructed message.
    pub fn user_message(&self) -> String {
        let is_production = std::env::var("NODE_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        if is_production && self.status_code() >= 500 {
            "Internal server error".to_string()
        } else {
            self.message.clone()
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// True when this failure requires manual settlement follow-up (a
    /// payout failure after tokens were already received).
    pub fn requires_manual_settlement(&self) -> bool {
        matches!(self.kind, AppErrorKind::External(ExternalError::PayoutFailed { .. }))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "success": false,
            "message": self.user_message(),
            "code": self.error_code(),
        });
        if let Some(details) = &self.details {
            body["details"] = details.clone();
        }
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let retryable = !matches!(err, sqlx::Error::RowNotFound);
        AppError::new(
            AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: err.to_string(),
                is_retryable: retryable,
            }),
            "A database error occurred",
        )
        .with_retryable(retryable)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::new(
            AppErrorKind::External(ExternalError::Upstream {
                service: "http".to_string(),
                message: err.to_string(),
            }),
            "An upstream service is unavailable",
        )
        .with_status_code(StatusCode::BAD_GATEWAY)
        .with_retryable(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_is_400() {
        let err = AppError::new(
            AppErrorKind::Validation(ValidationError::InvalidAmount {
                amount: "-1".to_string(),
                reason: "negative".to_string(),
            }),
            "bad amount",
        );
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
    }

    #[test]
    fn insufficient_liquidity_is_503_with_code() {
        let err = AppError::new(
            AppErrorKind::Domain(DomainError::InsufficientLiquidity {
                available_ngn: 10_000,
                shortfall_ngn: 4_000,
                max_order_ngn: 5_000,
            }),
            "insufficient liquidity",
        );
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.error_code(), ErrorCode::InsufficientLiquidity);
    }

    #[test]
    fn payout_failed_requires_manual_settlement() {
        let err = AppError::new(
            AppErrorKind::External(ExternalError::PayoutFailed {
                message: "provider down".to_string(),
            }),
            "payout failed",
        );
        assert_eq!(err.status_code(), 500);
        assert!(err.requires_manual_settlement());
    }

    #[test]
    fn status_code_override_wins() {
        let err = AppError::internal_error("boom").with_status_code(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn production_hides_5xx_message() {
        std::env::set_var("NODE_ENV", "production");
        let err = AppError::internal_error("leaked detail");
        assert_eq!(err.user_message(), "Internal server error");
        std::env::remove_var("NODE_ENV");
    }
}
