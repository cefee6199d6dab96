pub mod budgets;
pub mod sessions;
pub mod transactions;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Redis(String),
    BadRequest(String),
    Internal(String),
    Unauthorized,
    Forbidden,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Redis(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Redis: {msg}"))
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "credentials required".into())
            }
            Self::Forbidden => {
                (StatusCode::FORBIDDEN, "administrative role required".into())
            }
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

// ─── GET /api/health ─────────────────────────────────────────────

/// Liveness probe. Deliberately outside the instrumented surface so it
/// never skews request statistics.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
