//! `/api/onramp*` handlers: symmetric to the offramp routes but simpler —
//! rate preview, initialization, the Monnify payment webhook, status, and
//! history (§2).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::warn;

use crate::cache::{get_json, keys::StatusKey, set_json};
use crate::chains::stacks::types::is_valid_stacks_address;
use crate::database::{Direction, HistoryFilter, Token, Transaction, TxStatus};
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::settlement::onramp::{InitializeOnrampRequest, OnrampQuote};

use super::response::ApiResponse;
use super::AppState;

fn onramp_engine(state: &AppState) -> Result<&Arc<crate::settlement::OnrampEngine>, AppError> {
    state.onramp.as_ref().ok_or_else(|| {
        AppError::new(
            AppErrorKind::Infrastructure(crate::error::InfrastructureError::ConfigMissing {
                variable: "MONNIFY_*".to_string(),
            }),
            "onramp is not configured on this deployment",
        )
        .with_status_code(axum::http::StatusCode::SERVICE_UNAVAILABLE)
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuery {
    pub token: String,
    pub ngn_amount: i64,
}

pub async fn get_rate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RateQuery>,
) -> Result<ApiResponse<OnrampQuote>, AppError> {
    let engine = onramp_engine(&state)?;
    let token = parse_token(&query.token)?;
    let quote = engine.quote_onramp(token, query.ngn_amount).await?;
    Ok(ApiResponse::ok(quote))
}

pub async fn initialize(
    State(state): State<Arc<AppState>>,
    axum::Json(req): axum::Json<InitializeOnrampRequest>,
) -> Result<ApiResponse<Transaction>, AppError> {
    let engine = onramp_engine(&state)?;
    let record = engine.initialize_onramp(req).await?;
    Ok(ApiResponse::created(record))
}

pub async fn monnify_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<()>, AppError> {
    let engine = onramp_engine(&state)?;
    let signature = headers
        .get("monnify-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::new(
                AppErrorKind::Validation(ValidationError::MissingField {
                    field: "monnify-signature".to_string(),
                }),
                "missing webhook signature header",
            )
            .with_status_code(axum::http::StatusCode::UNAUTHORIZED)
        })?;

    engine.handle_payment_webhook(&body, signature).await?;
    Ok(ApiResponse::ok(()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAddressRequest {
    pub recipient_address: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAddressResponse {
    pub recipient_address: String,
    pub valid: bool,
}

/// Onramp's counterpart to `offramp::verify_account`: the recipient here is a
/// Stacks wallet address rather than a bank account, so "verify" is a format
/// check against the same address pattern the settlement engine enforces at
/// `initialize_onramp`, instead of a call out to a payment provider.
pub async fn verify_address(
    axum::Json(req): axum::Json<VerifyAddressRequest>,
) -> ApiResponse<VerifyAddressResponse> {
    let valid = is_valid_stacks_address(&req.recipient_address);
    ApiResponse::ok(VerifyAddressResponse { recipient_address: req.recipient_address, valid })
}

fn status_cache_ttl(status: TxStatus) -> u64 {
    match status {
        TxStatus::Pending => 5,
        TxStatus::Processing | TxStatus::Settling => 10,
        TxStatus::Confirmed | TxStatus::Failed => 300,
    }
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<ApiResponse<Transaction>, AppError> {
    let cache_key = StatusKey { direction: "onramp", reference: &reference }.to_string();
    if let Ok(Some(cached)) = get_json::<Transaction>(&*state.cache, &cache_key).await {
        return Ok(ApiResponse::ok(cached));
    }

    let record = state
        .settlement
        .transactions()
        .find_by_reference(&reference)
        .await?
        .ok_or_else(|| transaction_not_found(&reference))?;

    let ttl = status_cache_ttl(record.status);
    if let Err(e) = set_json(&*state.cache, &cache_key, &record, Some(ttl)).await {
        warn!(error = %e, "failed to cache onramp status response");
    }

    Ok(ApiResponse::ok(record))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub address: String,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub status: Option<String>,
    pub token: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub transactions: Vec<Transaction>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<ApiResponse<HistoryResponse>, AppError> {
    let filter = parse_history_filter(query.status.as_deref(), query.token.as_deref())?;
    let limit = query.limit.clamp(1, 100);
    let page = query.page.max(1);

    let transactions = state
        .settlement
        .transactions()
        .find_by_address(&query.address, Some(Direction::Onramp), &filter, page, limit)
        .await?;
    let total = state
        .settlement
        .transactions()
        .count_by_address(&query.address, Some(Direction::Onramp), &filter)
        .await?;

    Ok(ApiResponse::ok(HistoryResponse { transactions, page, limit, total }))
}

fn parse_token(raw: &str) -> Result<Token, AppError> {
    Token::from_str_loose(raw).ok_or_else(|| {
        AppError::new(
            AppErrorKind::Validation(ValidationError::InvalidCurrency {
                currency: raw.to_string(),
                reason: "must be STX or USDC".to_string(),
            }),
            "unsupported token",
        )
    })
}

fn parse_history_filter(status: Option<&str>, token: Option<&str>) -> Result<HistoryFilter, AppError> {
    let status = status
        .map(|s| match s {
            "pending" => Ok(TxStatus::Pending),
            "processing" => Ok(TxStatus::Processing),
            "settling" => Ok(TxStatus::Settling),
            "confirmed" => Ok(TxStatus::Confirmed),
            "failed" => Ok(TxStatus::Failed),
            other => Err(AppError::new(
                AppErrorKind::Validation(ValidationError::InvalidCurrency {
                    currency: other.to_string(),
                    reason: "not a recognized status".to_string(),
                }),
                "invalid status filter",
            )),
        })
        .transpose()?;
    let token = token.map(|t| parse_token(t)).transpose()?;
    Ok(HistoryFilter { status, token })
}

fn transaction_not_found(reference: &str) -> AppError {
    AppError::new(
        AppErrorKind::Domain(DomainError::TransactionNotFound {
            transaction_id: reference.to_string(),
        }),
        "transaction not found",
    )
}
