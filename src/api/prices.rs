//! `/api/prices*` handlers: the current composite snapshot, a single
//! token's price, bounded history, and an admin-gated forced refresh.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::database::{PriceSnapshot, Token};
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::services::{PriceSnapshotView, TokenPrice};

use super::response::ApiResponse;
use super::{require_internal_key, AppState};

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

pub async fn get_prices(State(state): State<Arc<AppState>>) -> ApiResponse<PriceSnapshotView> {
    ApiResponse::ok(state.price_oracle.get_current().await)
}

pub async fn get_token_price(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<ApiResponse<TokenPrice>, AppError> {
    let token = parse_token(&token)?;
    let snapshot = state.price_oracle.get_current().await;
    let price = match token {
        Token::Stx => snapshot.stx,
        Token::Usdc => snapshot.usdc,
    };
    Ok(ApiResponse::ok(price))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default = "default_hours")]
    pub hours: i64,
}

fn default_hours() -> i64 {
    24
}

pub async fn get_token_history(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<ApiResponse<Vec<PriceSnapshot>>, AppError> {
    let token = parse_token(&token)?;
    let hours = query.hours.clamp(1, 168);
    let since = chrono::Utc::now() - chrono::Duration::hours(hours);
    let history = state.price_oracle.get_history(token, since).await;
    Ok(ApiResponse::ok(history))
}

/// Admin-gated: forces an upstream refetch bypassing the cache TTL.
pub async fn refresh_prices(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<ApiResponse<PriceSnapshotView>, AppError> {
    require_internal_key(&state.config, &headers)?;
    Ok(ApiResponse::ok(state.price_oracle.force_refresh().await))
}
