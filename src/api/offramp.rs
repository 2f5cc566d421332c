//! `/api/offramp*` handlers: quote preview, account verification, deposit
//! initialization, chain-broadcast notification, the internal confirm-receipt
//! callback, the Lenco payout webhook, status lookup, and history/stats.
//!
//! Grounded on the teacher's `OnrampStatusService` cache-aside shape
//! (`api/onramp.rs`: cache key, per-status TTL, fall through to the store on
//! a miss) generalized from a single status lookup to every offramp route.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::warn;

use crate::cache::{get_json, keys::{StatusKey, BANK_LIST_KEY, MAX_ORDER_KEY}, set_json};
use crate::database::{Direction, HistoryFilter, Token, TokenStats, Transaction, TxStatus};
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::payments::types::{Bank, PayoutWebhookPayload, ResolvedAccount};
use crate::settlement::types::{InitializeOfframpRequest, NotifyTxResult, OfframpInitResult, OfframpQuote};
use crate::workers::spawn_watcher;

use super::response::ApiResponse;
use super::{require_internal_key, AppState};

/// Banks change rarely; cached a full day.
const BANK_LIST_TTL_SECS: u64 = 86_400;
const MAX_ORDER_TTL_SECS: u64 = 20;

pub async fn list_banks(State(state): State<Arc<AppState>>) -> Result<ApiResponse<Vec<Bank>>, AppError> {
    if let Ok(Some(cached)) = get_json::<Vec<Bank>>(&*state.cache, BANK_LIST_KEY).await {
        return Ok(ApiResponse::ok(cached));
    }

    let provider = state.payment_factory.default_provider()?;
    let banks = provider.list_banks().await?;
    let banks = crate::payments::types::sort_banks_fintech_first(banks);

    if let Err(e) = set_json(&*state.cache, BANK_LIST_KEY, &banks, Some(BANK_LIST_TTL_SECS)).await {
        warn!(error = %e, "failed to cache bank list");
    }
    Ok(ApiResponse::ok(banks))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuery {
    pub token: String,
    pub token_amount: f64,
}

pub async fn get_rate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RateQuery>,
) -> Result<ApiResponse<OfframpQuote>, AppError> {
    let token = parse_token(&query.token)?;
    let quote = state.settlement.quote_offramp(token, query.token_amount).await?;
    Ok(ApiResponse::ok(quote))
}

/// Never exposes the raw provider balance — only the derived order ceiling
/// and whether one is known at all.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityResponse {
    pub available: bool,
    pub max_order_ngn: Option<i64>,
    pub min_buffer_ngn: i64,
}

pub async fn get_liquidity(State(state): State<Arc<AppState>>) -> ApiResponse<LiquidityResponse> {
    if let Ok(Some(cached)) = get_json::<LiquidityResponse>(&*state.cache, MAX_ORDER_KEY).await {
        return ApiResponse::ok(cached);
    }

    let max_order_ngn = state.liquidity_guard.get_max_order_ngn().await;
    let response = LiquidityResponse {
        available: max_order_ngn.is_some(),
        max_order_ngn,
        min_buffer_ngn: state.config.offramp.min_buffer_ngn,
    };
    if let Err(e) = set_json(&*state.cache, MAX_ORDER_KEY, &response, Some(MAX_ORDER_TTL_SECS)).await {
        warn!(error = %e, "failed to cache liquidity response");
    }
    ApiResponse::ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAccountRequest {
    pub bank_code: String,
    pub account_number: String,
}

pub async fn verify_account(
    State(state): State<Arc<AppState>>,
    axum::Json(req): axum::Json<VerifyAccountRequest>,
) -> Result<ApiResponse<ResolvedAccount>, AppError> {
    let provider = state.payment_factory.default_provider()?;
    let resolved = provider.resolve_account(&req.bank_code, &req.account_number).await?;
    Ok(ApiResponse::ok(resolved))
}

pub async fn initialize(
    State(state): State<Arc<AppState>>,
    axum::Json(req): axum::Json<InitializeOfframpRequest>,
) -> Result<ApiResponse<OfframpInitResult>, AppError> {
    let result = state.settlement.initialize_offramp(req).await?;
    Ok(ApiResponse::created(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyTxRequest {
    pub reference: String,
    pub chain_tx_id: String,
}

pub async fn notify_tx(
    State(state): State<Arc<AppState>>,
    axum::Json(req): axum::Json<NotifyTxRequest>,
) -> Result<ApiResponse<NotifyTxResult>, AppError> {
    let result = state.settlement.notify_tx_broadcast(&req.reference, &req.chain_tx_id).await?;

    if matches!(result, NotifyTxResult::Watching) {
        let record = state
            .settlement
            .transactions()
            .find_by_reference(&req.reference)
            .await?
            .ok_or_else(|| transaction_not_found(&req.reference))?;
        spawn_watcher(
            Arc::clone(&state.settlement),
            req.reference.clone(),
            req.chain_tx_id.clone(),
            record.token,
            record.sender_address.clone(),
            state.config.offramp.confirmation_blocks,
        );
    }

    Ok(ApiResponse::ok(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmReceiptRequest {
    pub reference: String,
    pub chain_tx_id: String,
    pub token_amount: f64,
    pub token: Token,
    pub sender_address: String,
}

/// Internal-only: called by the chain indexer or the per-transaction
/// watcher, never by an external client (§4.6/§4.7).
pub async fn confirm_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<ConfirmReceiptRequest>,
) -> Result<ApiResponse<crate::settlement::types::ConfirmReceiptResult>, AppError> {
    require_internal_key(&state.config, &headers)?;
    let result = state
        .settlement
        .confirm_receipt(&req.reference, &req.chain_tx_id, req.token_amount, req.token, &req.sender_address)
        .await?;
    Ok(ApiResponse::ok(result))
}

/// Lenco's payout webhook. Signature is verified over the exact raw body
/// before it is parsed (§4.8).
pub async fn lenco_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<()>, AppError> {
    let provider = state.payment_factory.default_provider()?;
    let signature = headers
        .get("x-lenco-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::new(
                AppErrorKind::Validation(ValidationError::MissingField {
                    field: "x-lenco-signature".to_string(),
                }),
                "missing webhook signature header",
            )
            .with_status_code(axum::http::StatusCode::UNAUTHORIZED)
        })?;

    if !provider.verify_webhook_signature(&body, signature) {
        return Err(AppError::new(
            AppErrorKind::Validation(ValidationError::MissingField {
                field: "x-lenco-signature".to_string(),
            }),
            "invalid webhook signature",
        )
        .with_status_code(axum::http::StatusCode::UNAUTHORIZED));
    }

    let payload: PayoutWebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::internal_error(format!("malformed Lenco webhook body: {e}")))?;

    state.settlement.handle_payout_webhook(payload).await?;
    Ok(ApiResponse::ok(()))
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
    let cache_key = StatusKey { direction: "offramp", reference: &reference }.to_string();
    if let Ok(Some(cached)) = get_json::<Transaction>(&*state.cache, &cache_key).await {
        return Ok(ApiResponse::ok(cached));
    }

    state.settlement.expire_if_overdue(&reference).await?;

    let record = state
        .settlement
        .transactions()
        .find_by_reference(&reference)
        .await?
        .ok_or_else(|| transaction_not_found(&reference))?;

    let ttl = status_cache_ttl(record.status);
    if let Err(e) = set_json(&*state.cache, &cache_key, &record, Some(ttl)).await {
        warn!(error = %e, "failed to cache offramp status response");
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
        .find_by_address(&query.address, Some(Direction::Offramp), &filter, page, limit)
        .await?;
    let total = state
        .settlement
        .transactions()
        .count_by_address(&query.address, Some(Direction::Offramp), &filter)
        .await?;

    Ok(ApiResponse::ok(HistoryResponse { transactions, page, limit, total }))
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub buckets: Vec<TokenStats>,
    pub max_order_ngn: Option<i64>,
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<ApiResponse<StatsResponse>, AppError> {
    let buckets = state.settlement.transactions().aggregate().await?;
    let max_order_ngn = state.liquidity_guard.get_max_order_ngn().await;
    Ok(ApiResponse::ok(StatsResponse { buckets, max_order_ngn }))
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
