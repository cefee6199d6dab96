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

// ─── Constants ───────────────────────────────────────────────────

/// Ids retained in the recent-transactions index.
const RECENT_INDEX_LEN: isize = 100;
/// Page size for the list endpoint.
const LIST_LIMIT: isize = 20;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub description: String,
    pub amount_cents: i64,
    pub category: String,
    pub occurred_on: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub description: String,
    pub amount_cents: i64,
    #[serde(default = "default_category")]
    pub category: String,
    /// Defaults to today when omitted.
    #[serde(default)]
    pub occurred_on: Option<String>,
}

fn default_category() -> String {
    "uncategorized".into()
}

// ─── GET /api/transactions/:id ───────────────────────────────────

pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let key = format!("transaction:{id}");

    let mut conn = state.redis.clone();
    let map: HashMap<String, String> = conn
        .hgetall(&key)
        .await
        .map_err(|e| AppError::Redis(e.to_string()))?;

    if map.is_empty() {
        return Err(AppError::NotFound(format!("transaction '{id}' not found")));
    }

    Ok(Json(transaction_from_map(&map)))
}

// ─── GET /api/transactions ───────────────────────────────────────

pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let mut conn = state.redis.clone();

    let ids: Vec<String> = conn
        .lrange("transactions:recent", 0, LIST_LIMIT - 1)
        .await
        .map_err(|e| AppError::Redis(e.to_string()))?;

    if ids.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let mut pipe = redis::pipe();
    for id in &ids {
        pipe.cmd("HGETALL").arg(format!("transaction:{id}"));
    }
    let maps: Vec<HashMap<String, String>> = pipe
        .query_async(&mut conn)
        .await
        .map_err(|e| AppError::Redis(e.to_string()))?;

    Ok(Json(
        maps.iter()
            .filter(|map| !map.is_empty())
            .map(transaction_from_map)
            .collect(),
    ))
}

// ─── POST /api/transactions ──────────────────────────────────────

pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<Json<Transaction>, AppError> {
    if req.description.trim().is_empty() {
        return Err(AppError::BadRequest("description must not be empty".into()));
    }
    if req.amount_cents == 0 {
        return Err(AppError::BadRequest("amount_cents must be non-zero".into()));
    }

    let txn = Transaction {
        id: format!("txn_{}", &uuid::Uuid::new_v4().to_string()[..8]),
        description: req.description,
        amount_cents: req.amount_cents,
        category: req.category,
        occurred_on: req
            .occurred_on
            .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string()),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    let key = format!("transaction:{}", txn.id);
    let mut conn = state.redis.clone();

    let mut pipe = redis::pipe();
    pipe.cmd("HSET")
        .arg(&key)
        .arg("id")
        .arg(&txn.id)
        .arg("description")
        .arg(&txn.description)
        .arg("amount_cents")
        .arg(txn.amount_cents)
        .arg("category")
        .arg(&txn.category)
        .arg("occurred_on")
        .arg(&txn.occurred_on)
        .arg("created_at")
        .arg(&txn.created_at)
        .ignore();
    pipe.cmd("LPUSH")
        .arg("transactions:recent")
        .arg(&txn.id)
        .ignore();
    pipe.cmd("LTRIM")
        .arg("transactions:recent")
        .arg(0)
        .arg(RECENT_INDEX_LEN - 1)
        .ignore();
    pipe.cmd("INCR").arg("count:transactions").ignore();

    let _: () = pipe
        .query_async(&mut conn)
        .await
        .map_err(|e| AppError::Redis(e.to_string()))?;

    Ok(Json(txn))
}

// ─── Helpers ─────────────────────────────────────────────────────

fn transaction_from_map(map: &HashMap<String, String>) -> Transaction {
    Transaction {
        id: map.get("id").cloned().unwrap_or_default(),
        description: map.get("description").cloned().unwrap_or_default(),
        amount_cents: map
            .get("amount_cents")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        category: map.get("category").cloned().unwrap_or_default(),
        occurred_on: map.get("occurred_on").cloned().unwrap_or_default(),
        created_at: map.get("created_at").cloned().unwrap_or_default(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────
