//! Redis-backed implementations of the external facts the snapshot
//! builder embeds: session counts and store health. Both are read-only
//! and invoked only from the snapshot path, never on request hot paths.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::metrics::snapshot::{
    DatabaseHealth, DbHealthReport, DbStatus, SessionCounter, SessionCounts,
};

/// Entities whose row counts ride along in the health report.
const COUNTED_ENTITIES: &[&str] = &["transactions", "budgets"];

// ─── Session counts ──────────────────────────────────────────────

pub struct RedisSessionCounter {
    conn: ConnectionManager,
}

impl RedisSessionCounter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionCounter for RedisSessionCounter {
    async fn session_counts(&self) -> anyhow::Result<SessionCounts> {
        let mut conn = self.conn.clone();

        let total: Option<u64> = conn.get("sessions:total").await?;

        // Live sessions carry a TTL, so counting keys gives the active
        // set without any separate expiry bookkeeping.
        let mut active = 0u64;
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match("session:*").await?;
        while iter.next_item().await.is_some() {
            active += 1;
        }

        Ok(SessionCounts {
            active,
            total: total.unwrap_or(0),
        })
    }
}

// ─── Store health ────────────────────────────────────────────────

pub struct RedisDatabaseHealth {
    conn: ConnectionManager,
}

impl RedisDatabaseHealth {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DatabaseHealth for RedisDatabaseHealth {
    async fn check(&self) -> anyhow::Result<DbHealthReport> {
        let mut conn = self.conn.clone();

        let started = Instant::now();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        let round_trip_ms = started.elapsed().as_secs_f64() * 1000.0;

        let status = if reply == "PONG" {
            DbStatus::Healthy
        } else {
            DbStatus::Unhealthy
        };

        let mut entity_counts = BTreeMap::new();
        for entity in COUNTED_ENTITIES {
            let count: Option<u64> = conn.get(format!("count:{entity}")).await?;
            entity_counts.insert((*entity).to_owned(), count.unwrap_or(0));
        }

        Ok(DbHealthReport {
            status,
            round_trip_ms,
            entity_counts,
        })
    }
}
