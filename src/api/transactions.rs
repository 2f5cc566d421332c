//! Generic transaction record CRUD (§6 ambient addition): a direction-agnostic
//! admin view over the same store the offramp/onramp routes use, plus a
//! status override for manual intervention on stuck records.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::database::{Direction, HistoryFilter, Token, Transaction, TxStatus};
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};

use super::response::ApiResponse;
use super::{require_internal_key, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub direction: Option<String>,
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
pub struct ListResponse {
    pub transactions: Vec<Transaction>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<ListResponse>, AppError> {
    let direction = parse_direction(query.direction.as_deref())?;
    let filter = parse_history_filter(query.status.as_deref(), query.token.as_deref())?;
    let limit = query.limit.clamp(1, 100);
    let page = query.page.max(1);

    let repo = state.settlement.transactions();
    let transactions = repo.list_all(direction, &filter, page, limit).await?;
    let total = repo.count_all(direction, &filter).await?;

    Ok(ApiResponse::ok(ListResponse { transactions, page, limit, total }))
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<ApiResponse<Transaction>, AppError> {
    let record = state
        .settlement
        .transactions()
        .find_by_id(id)
        .await?
        .ok_or_else(|| transaction_not_found(&id.to_string()))?;
    Ok(ApiResponse::ok(record))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchStatusRequest {
    pub status: String,
}

/// Internal-only: an unconditional status override for manual intervention,
/// never a path the normal state machine transitions take.
pub async fn patch_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<uuid::Uuid>,
    axum::Json(req): axum::Json<PatchStatusRequest>,
) -> Result<ApiResponse<Transaction>, AppError> {
    require_internal_key(&state.config, &headers)?;
    let status = parse_status(&req.status)?;
    let record = state
        .settlement
        .transactions()
        .set_status_admin(id, status)
        .await?
        .ok_or_else(|| transaction_not_found(&id.to_string()))?;
    Ok(ApiResponse::ok(record))
}

fn parse_direction(raw: Option<&str>) -> Result<Option<Direction>, AppError> {
    raw.map(|s| match s {
        "offramp" => Ok(Direction::Offramp),
        "onramp" => Ok(Direction::Onramp),
        other => Err(invalid_field("direction", other, "must be offramp or onramp")),
    })
    .transpose()
}

fn parse_status(raw: &str) -> Result<TxStatus, AppError> {
    match raw {
        "pending" => Ok(TxStatus::Pending),
        "processing" => Ok(TxStatus::Processing),
        "settling" => Ok(TxStatus::Settling),
        "confirmed" => Ok(TxStatus::Confirmed),
        "failed" => Ok(TxStatus::Failed),
        other => Err(invalid_field("status", other, "not a recognized status")),
    }
}

fn parse_token(raw: &str) -> Result<Token, AppError> {
    Token::from_str_loose(raw).ok_or_else(|| invalid_field("token", raw, "must be STX or USDC"))
}

fn parse_history_filter(status: Option<&str>, token: Option<&str>) -> Result<HistoryFilter, AppError> {
    let status = status.map(parse_status).transpose()?;
    let token = token.map(parse_token).transpose()?;
    Ok(HistoryFilter { status, token })
}

fn invalid_field(field: &str, value: &str, reason: &str) -> AppError {
    AppError::new(
        AppErrorKind::Validation(ValidationError::InvalidCurrency {
            currency: value.to_string(),
            reason: format!("{field}: {reason}"),
        }),
        "invalid query parameter",
    )
}

fn transaction_not_found(id: &str) -> AppError {
    AppError::new(
        AppErrorKind::Domain(DomainError::TransactionNotFound { transaction_id: id.to_string() }),
        "transaction not found",
    )
}
