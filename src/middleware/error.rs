//! Error handling middleware: uniform 404 fallback and panic containment.
//!
//! `AppError` implements `IntoResponse` directly (see `crate::error`), so most
//! handlers simply `?`-propagate it. This module covers the two cases that
//! never reach a handler: unmatched routes and panics inside a handler.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Fallback for routes that don't match any registered handler.
#[cfg(feature = "database")]
pub async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "Route not found",
            "code": "NOT_FOUND",
        })),
    )
}

/// Renders a caught panic as a standard error envelope instead of dropping
/// the connection. Wired via `tower_http::catch_panic::CatchPanicLayer`.
#[cfg(feature = "database")]
pub fn render_panic(_err: Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response {
    tracing::error!(event_type = "panic", "Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "message": "Internal server error",
            "code": "INTERNAL_ERROR",
        })),
    )
        .into_response()
}

#[cfg(all(test, feature = "database"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_found_returns_404() {
        let response = not_found_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
