//! HTTP API (A4): `AppState` bundles every long-lived dependency handlers
//! need; `router` wires routes and the middleware stack.
//!
//! Grounded on the teacher's per-endpoint `*Service` structs (see
//! `api/onramp.rs`'s `OnrampStatusService`) generalized into a single shared
//! state struct, since this crate's handlers are free functions rather than
//! one service-per-endpoint.

use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::cache::Cache;
use crate::chains::stacks::StacksClient;
use crate::config::AppConfig;
use crate::database::TransactionRepository;
use crate::error::{AppError, AppErrorKind, InfrastructureError, ValidationError};
use crate::middleware::error::{not_found_handler, render_panic};
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::payments::PaymentProviderFactory;
use crate::services::{LiquidityGuard, PriceOracleCache};
use crate::settlement::{OnrampEngine, SettlementEngine};

pub mod health;
pub mod offramp;
pub mod onramp;
pub mod prices;
pub mod response;
pub mod transactions;

/// Shared dependencies for every handler, assembled once in `main` and
/// handed to the router behind an `Arc`.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<dyn Cache>,
    pub transactions: Arc<TransactionRepository>,
    pub price_oracle: Arc<PriceOracleCache>,
    pub liquidity_guard: Arc<LiquidityGuard>,
    pub payment_factory: Arc<PaymentProviderFactory>,
    pub stacks_client: Arc<StacksClient>,
    pub settlement: Arc<SettlementEngine>,
    pub onramp: Option<Arc<OnrampEngine>>,
    pub started_at: Instant,
}

/// Checks the `x-internal-key` header against `INTERNAL_API_KEY`, used by
/// the two handlers only the chain indexer and watcher are meant to call
/// (`confirm-receipt`) plus the admin-gated price refresh.
pub(crate) fn require_internal_key(config: &AppConfig, headers: &HeaderMap) -> Result<(), AppError> {
    let configured = config.internal_api_key.as_deref().ok_or_else(|| {
        AppError::new(
            AppErrorKind::Infrastructure(InfrastructureError::ConfigMissing {
                variable: "INTERNAL_API_KEY".to_string(),
            }),
            "internal API key is not configured",
        )
        .with_status_code(axum::http::StatusCode::SERVICE_UNAVAILABLE)
    })?;

    let provided = headers.get("x-internal-key").and_then(|v| v.to_str().ok());
    if provided != Some(configured) {
        return Err(AppError::new(
            AppErrorKind::Validation(ValidationError::MissingField {
                field: "x-internal-key".to_string(),
            }),
            "missing or invalid internal API key",
        )
        .with_status_code(axum::http::StatusCode::UNAUTHORIZED));
    }
    Ok(())
}

fn build_cors(allowed_origin: &str) -> CorsLayer {
    if allowed_origin == "*" {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    match allowed_origin.parse::<axum::http::HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = build_cors(&state.config.allowed_origin);

    Router::new()
        .route("/health", get(health::health))
        .route("/api/prices", get(prices::get_prices))
        .route("/api/prices/refresh", post(prices::refresh_prices))
        .route("/api/prices/{token}", get(prices::get_token_price))
        .route("/api/prices/{token}/history", get(prices::get_token_history))
        .route("/api/offramp/banks", get(offramp::list_banks))
        .route("/api/offramp/rate", get(offramp::get_rate))
        .route("/api/offramp/liquidity", get(offramp::get_liquidity))
        .route("/api/offramp/stats", get(offramp::get_stats))
        .route("/api/offramp/verify-account", post(offramp::verify_account))
        .route("/api/offramp/initialize", post(offramp::initialize))
        .route("/api/offramp/notify-tx", post(offramp::notify_tx))
        .route("/api/offramp/confirm-receipt", post(offramp::confirm_receipt))
        .route("/api/offramp/lenco-webhook", post(offramp::lenco_webhook))
        .route("/api/offramp/history", get(offramp::get_history))
        .route("/api/offramp/status/{reference}", get(offramp::get_status))
        .route("/api/onramp/rate", get(onramp::get_rate))
        .route("/api/onramp/verify-address", post(onramp::verify_address))
        .route("/api/onramp/initialize", post(onramp::initialize))
        .route("/api/onramp/monnify-webhook", post(onramp::monnify_webhook))
        .route("/api/onramp/history", get(onramp::get_history))
        .route("/api/onramp/status/{reference}", get(onramp::get_status))
        .route("/api/transactions", get(transactions::list))
        .route("/api/transactions/{id}", get(transactions::get_by_id))
        .route("/api/transactions/{id}/status", patch(transactions::patch_status))
        .fallback(not_found_handler)
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(render_panic))
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
