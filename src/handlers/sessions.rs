use axum::{
    extract::{Path, State},
    Json,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;

use super::AppError;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub role: String,
    pub token: String,
    pub ip: String,
    pub created_at: String,
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

fn default_role() -> String {
    "member".into()
}
fn default_ip() -> String {
    "127.0.0.1".into()
}
fn default_ttl() -> u64 {
    1800
}

// ─── GET /api/sessions/:id ───────────────────────────────────────

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    let key = format!("session:{id}");

    let mut conn = state.redis.clone();
    let maybe_json: Option<String> = conn
        .get(&key)
        .await
        .map_err(|e| AppError::Redis(e.to_string()))?;

    let json_str = maybe_json.ok_or_else(|| {
        AppError::NotFound(format!("session '{id}' not found or expired"))
    })?;

    let session: Session = serde_json::from_str(&json_str)
        .map_err(|e| AppError::Internal(format!("corrupt session data: {e}")))?;

    Ok(Json(session))
}

// ─── POST /api/sessions ──────────────────────────────────────────

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<Session>, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user_id must not be empty".into()));
    }

    let session = Session {
        id: format!("sess_{}", &uuid::Uuid::new_v4().to_string()[..8]),
        user_id: req.user_id,
        role: req.role,
        token: format!("tok_{}", uuid::Uuid::new_v4()),
        ip: req.ip,
        created_at: chrono::Utc::now().to_rfc3339(),
        ttl_secs: req.ttl_secs,
    };

    let key = format!("session:{}", session.id);
    let json_str = serde_json::to_string(&session)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut conn = state.redis.clone();

    // The key's TTL is what makes the session "active" for the session
    // counter; the monotonic total never decreases.
    let mut pipe = redis::pipe();
    pipe.cmd("SET")
        .arg(&key)
        .arg(&json_str)
        .arg("EX")
        .arg(session.ttl_secs)
        .ignore();
    pipe.cmd("INCR").arg("sessions:total").ignore();

    let _: () = pipe
        .query_async(&mut conn)
        .await
        .map_err(|e| AppError::Redis(e.to_string()))?;

    Ok(Json(session))
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_applies_defaults() {
        let req: CreateSessionRequest =
            serde_json::from_str(r#"{"user_id":"usr_1"}"#).expect("parse");
        assert_eq!(req.role, "member");
        assert_eq!(req.ip, "127.0.0.1");
        assert_eq!(req.ttl_secs, 1800);
    }
}
