//! `GET /health` — liveness probe, no dependencies touched.

use std::sync::Arc;

use axum::extract::State;
use serde::Serialize;

use super::response::ApiResponse;
use super::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub uptime_secs: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResponse<HealthResponse> {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.node_env.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
