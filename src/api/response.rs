//! The `{success: true, data}` half of the HTTP envelope. `AppError` (see
//! `crate::error`) already renders the `{success: false, ...}` half directly,
//! so handlers just return `Result<ApiResponse<T>, AppError>` and `?`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

pub struct ApiResponse<T> {
    status: StatusCode,
    data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { status: StatusCode::OK, data }
    }

    pub fn created(data: T) -> Self {
        Self { status: StatusCode::CREATED, data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let body = json!({
            "success": true,
            "data": self.data,
        });
        (self.status, Json(body)).into_response()
    }
}
