use axum::{
    extract::{Path, State},
    Json,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::AppState;

use super::AppError;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    pub category: String,
    pub limit_cents: i64,
    /// Month the cap applies to, "YYYY-MM".
    pub month: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBudgetRequest {
    pub category: String,
    pub limit_cents: i64,
    /// Defaults to the current month when omitted.
    #[serde(default)]
    pub month: Option<String>,
}

// ─── GET /api/budgets/:id ────────────────────────────────────────

pub async fn get_budget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Budget>, AppError> {
    let key = format!("budget:{id}");

    let mut conn = state.redis.clone();
    let map: HashMap<String, String> = conn
        .hgetall(&key)
        .await
        .map_err(|e| AppError::Redis(e.to_string()))?;

    if map.is_empty() {
        return Err(AppError::NotFound(format!("budget '{id}' not found")));
    }

    Ok(Json(budget_from_map(&map)))
}

// ─── POST /api/budgets ───────────────────────────────────────────

pub async fn create_budget(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBudgetRequest>,
) -> Result<Json<Budget>, AppError> {
    if req.category.trim().is_empty() {
        return Err(AppError::BadRequest("category must not be empty".into()));
    }
    if req.limit_cents <= 0 {
        return Err(AppError::BadRequest("limit_cents must be positive".into()));
    }

    let budget = Budget {
        id: format!("bud_{}", &uuid::Uuid::new_v4().to_string()[..8]),
        category: req.category,
        limit_cents: req.limit_cents,
        month: req
            .month
            .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m").to_string()),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    let key = format!("budget:{}", budget.id);
    let mut conn = state.redis.clone();

    let mut pipe = redis::pipe();
    pipe.cmd("HSET")
        .arg(&key)
        .arg("id")
        .arg(&budget.id)
        .arg("category")
        .arg(&budget.category)
        .arg("limit_cents")
        .arg(budget.limit_cents)
        .arg("month")
        .arg(&budget.month)
        .arg("created_at")
        .arg(&budget.created_at)
        .ignore();
    pipe.cmd("INCR").arg("count:budgets").ignore();

    let _: () = pipe
        .query_async(&mut conn)
        .await
        .map_err(|e| AppError::Redis(e.to_string()))?;

    Ok(Json(budget))
}

// ─── Helpers ─────────────────────────────────────────────────────

fn budget_from_map(map: &HashMap<String, String>) -> Budget {
    Budget {
        id: map.get("id").cloned().unwrap_or_default(),
        category: map.get("category").cloned().unwrap_or_default(),
        limit_cents: map
            .get("limit_cents")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        month: map.get("month").cloned().unwrap_or_default(),
        created_at: map.get("created_at").cloned().unwrap_or_default(),
    }
}
