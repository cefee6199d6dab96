//! Point-in-time composition of endpoint stats, process facts, and
//! collaborator reports into one immutable value.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::timeout;
use tracing::warn;

use super::aggregate::{aggregate, Aggregate};
use super::recorder::{SampleRecorder, WindowSnapshot};

// ─── Collaborator interfaces ─────────────────────────────────────
// Implemented by the excluded subsystems (session bookkeeping and the
// entity store). The builder calls them under a timeout and substitutes
// explicit "unknown" values on failure.

#[derive(Debug, Clone)]
pub struct SessionCounts {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DbStatus {
    Healthy,
    Unhealthy,
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct DbHealthReport {
    pub status: DbStatus,
    pub round_trip_ms: f64,
    pub entity_counts: BTreeMap<String, u64>,
}

#[async_trait]
pub trait SessionCounter: Send + Sync {
    async fn session_counts(&self) -> anyhow::Result<SessionCounts>;
}

#[async_trait]
pub trait DatabaseHealth: Send + Sync {
    async fn check(&self) -> anyhow::Result<DbHealthReport>;
}

// ─── Wire types ──────────────────────────────────────────────────

/// Derived statistics for one endpoint. Recomputed from a window
/// snapshot on every read; nothing here is cached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub endpoint_key: String,
    pub total_requests: u64,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
}

impl EndpointStats {
    pub fn from_window(endpoint_key: String, window: &WindowSnapshot) -> Self {
        let Aggregate { avg, min, max, p95 } = aggregate(&window.samples);
        Self {
            endpoint_key,
            total_requests: window.total_count,
            average_ms: avg,
            min_ms: min,
            max_ms: max,
            p95_ms: p95,
        }
    }
}

/// Complete view of the process, shipped to dashboards as JSON.
/// Immutable after construction; shared as `Arc<ProcessSnapshot>`.
/// Collaborator values that could not be obtained serialize as `null`
/// (or `"unreachable"` for the database status).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub generated_at: DateTime<Utc>,
    pub total_requests: u64,
    pub tracked_endpoints: usize,
    #[serde(rename = "memoryUsageMB")]
    pub memory_usage_mb: f64,
    pub uptime_seconds: u64,
    pub cpu_time_seconds: f64,
    pub thread_count: usize,
    pub endpoint_stats: Vec<EndpointStats>,
    pub active_sessions: Option<u64>,
    pub total_sessions: Option<u64>,
    pub db_status: DbStatus,
    pub db_connection_time_ms: Option<f64>,
    pub entity_counts: BTreeMap<String, u64>,
}

// ─── Process probe ───────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
struct ProcessFacts {
    memory_usage_mb: f64,
    uptime_seconds: u64,
    cpu_time_seconds: f64,
    thread_count: usize,
}

/// Reads resident memory, accumulated CPU time, and thread count for
/// the current process. Falls back to zeros if the pid cannot be
/// resolved; a snapshot is never blocked on host introspection.
struct ProcessProbe {
    pid: Option<Pid>,
    system: Mutex<System>,
    started: Instant,
}

impl ProcessProbe {
    fn new() -> Self {
        Self {
            pid: get_current_pid().ok(),
            system: Mutex::new(System::new()),
            started: Instant::now(),
        }
    }

    fn facts(&self) -> ProcessFacts {
        let uptime_seconds = self.started.elapsed().as_secs();
        let Some(pid) = self.pid else {
            return ProcessFacts {
                uptime_seconds,
                ..ProcessFacts::default()
            };
        };

        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );

        match system.process(pid) {
            Some(process) => ProcessFacts {
                memory_usage_mb: process.memory() as f64 / (1024.0 * 1024.0),
                uptime_seconds,
                cpu_time_seconds: process.accumulated_cpu_time() as f64 / 1000.0,
                thread_count: process.tasks().map_or(0, |tasks| tasks.len()),
            },
            None => ProcessFacts {
                uptime_seconds,
                ..ProcessFacts::default()
            },
        }
    }
}

// ─── SnapshotBuilder ─────────────────────────────────────────────

/// Assembles a fresh [`ProcessSnapshot`] on demand. Pure read path:
/// it never mutates recorder state, and any collaborator failure is
/// contained inside the snapshot rather than propagated.
pub struct SnapshotBuilder {
    recorder: Arc<SampleRecorder>,
    sessions: Arc<dyn SessionCounter>,
    db: Arc<dyn DatabaseHealth>,
    probe: ProcessProbe,
    collaborator_timeout: Duration,
}

impl SnapshotBuilder {
    pub fn new(
        recorder: Arc<SampleRecorder>,
        sessions: Arc<dyn SessionCounter>,
        db: Arc<dyn DatabaseHealth>,
        collaborator_timeout: Duration,
    ) -> Self {
        Self {
            recorder,
            sessions,
            db,
            probe: ProcessProbe::new(),
            collaborator_timeout,
        }
    }

    pub async fn build(&self) -> ProcessSnapshot {
        // ── Endpoint aggregates ─────────────────────────────────
        let mut keys = self.recorder.endpoint_keys();
        keys.sort();

        let mut endpoint_stats = Vec::with_capacity(keys.len());
        let mut total_requests = 0u64;
        for key in keys {
            if let Some(window) = self.recorder.snapshot(&key) {
                total_requests += window.total_count;
                endpoint_stats.push(EndpointStats::from_window(key, &window));
            }
        }

        // ── Host runtime facts ──────────────────────────────────
        let facts = self.probe.facts();

        // ── External collaborators, each under its own timeout ──
        let (active_sessions, total_sessions) =
            match timeout(self.collaborator_timeout, self.sessions.session_counts()).await {
                Ok(Ok(counts)) => (Some(counts.active), Some(counts.total)),
                Ok(Err(error)) => {
                    warn!(%error, "session counter unavailable");
                    (None, None)
                }
                Err(_) => {
                    warn!("session counter timed out");
                    (None, None)
                }
            };

        let (db_status, db_connection_time_ms, entity_counts) =
            match timeout(self.collaborator_timeout, self.db.check()).await {
                Ok(Ok(report)) => (report.status, Some(report.round_trip_ms), report.entity_counts),
                Ok(Err(error)) => {
                    warn!(%error, "database health check failed");
                    (DbStatus::Unreachable, None, BTreeMap::new())
                }
                Err(_) => {
                    warn!("database health check timed out");
                    (DbStatus::Unreachable, None, BTreeMap::new())
                }
            };

        ProcessSnapshot {
            generated_at: Utc::now(),
            total_requests,
            tracked_endpoints: endpoint_stats.len(),
            memory_usage_mb: facts.memory_usage_mb,
            uptime_seconds: facts.uptime_seconds,
            cpu_time_seconds: facts.cpu_time_seconds,
            thread_count: facts.thread_count,
            endpoint_stats,
            active_sessions,
            total_sessions,
            db_status,
            db_connection_time_ms,
            entity_counts,
        }
    }
}

// ─── Test doubles ────────────────────────────────────────────────


// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::metrics::Sample;

    fn builder_with(
        recorder: Arc<SampleRecorder>,
        sessions: Arc<dyn SessionCounter>,
        db: Arc<dyn DatabaseHealth>,
    ) -> SnapshotBuilder {
        SnapshotBuilder::new(recorder, sessions, db, Duration::from_millis(250))
    }

    #[tokio::test]
    async fn build_merges_endpoint_stats_and_collaborator_facts() {
        let recorder = Arc::new(SampleRecorder::new());
        for v in 1..=150 {
            recorder.record(Sample::new("GET /api/transactions/:id", f64::from(v)));
        }
        recorder.record(Sample::new("POST /api/budgets", 3.0));

        let builder = builder_with(
            recorder,
            Arc::new(StubSessions { active: 3, total: 41 }),
            Arc::new(StubDb),
        );
        let snapshot = builder.build().await;

        assert_eq!(snapshot.tracked_endpoints, 2);
        assert_eq!(snapshot.total_requests, 151);

        // Keys come out sorted, so the GET window is first.
        let stats = &snapshot.endpoint_stats[0];
        assert_eq!(stats.endpoint_key, "GET /api/transactions/:id");
        assert_eq!(stats.total_requests, 150);
        assert_eq!(stats.min_ms, 51.0);
        assert_eq!(stats.max_ms, 150.0);
        assert_eq!(stats.average_ms, 100.5);
        assert_eq!(stats.p95_ms, 145.0);

        assert_eq!(snapshot.active_sessions, Some(3));
        assert_eq!(snapshot.total_sessions, Some(41));
        assert_eq!(snapshot.db_status, DbStatus::Healthy);
        assert_eq!(snapshot.entity_counts.get("transactions"), Some(&7));
    }

    #[tokio::test(start_paused = true)]
    async fn db_timeout_substitutes_unreachable() {
        let recorder = Arc::new(SampleRecorder::new());
        recorder.record(Sample::new("GET /api/budgets/:id", 8.0));

        let builder = builder_with(
            recorder,
            Arc::new(StubSessions { active: 1, total: 5 }),
            Arc::new(StalledDb),
        );
        let snapshot = builder.build().await;

        assert_eq!(snapshot.db_status, DbStatus::Unreachable);
        assert_eq!(snapshot.db_connection_time_ms, None);
        assert!(snapshot.entity_counts.is_empty());

        // Everything else is still populated normally.
        assert_eq!(snapshot.tracked_endpoints, 1);
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.active_sessions, Some(1));
    }

    #[tokio::test]
    async fn session_failure_leaves_counts_unknown() {
        let builder = builder_with(
            Arc::new(SampleRecorder::new()),
            Arc::new(FailingSessions),
            Arc::new(StubDb),
        );
        let snapshot = builder.build().await;

        assert_eq!(snapshot.active_sessions, None);
        assert_eq!(snapshot.total_sessions, None);
        assert_eq!(snapshot.db_status, DbStatus::Healthy);
    }

    #[tokio::test]
    async fn wire_shape_uses_camel_case_keys() {
        let recorder = Arc::new(SampleRecorder::new());
        recorder.record(Sample::new("GET /api/transactions", 2.5));

        let builder = builder_with(recorder, Arc::new(FailingSessions), Arc::new(StubDb));
        let snapshot = builder.build().await;
        let value = serde_json::to_value(&snapshot).expect("serialize");

        assert!(value.get("totalRequests").is_some());
        assert!(value.get("trackedEndpoints").is_some());
        assert!(value.get("memoryUsageMB").is_some());
        assert!(value.get("uptimeSeconds").is_some());
        assert!(value.get("cpuTimeSeconds").is_some());
        assert!(value.get("threadCount").is_some());
        assert!(value.get("dbConnectionTimeMs").is_some());
        assert_eq!(value["dbStatus"], "healthy");
        assert!(value["activeSessions"].is_null());

        let stats = &value["endpointStats"][0];
        assert_eq!(stats["endpointKey"], "GET /api/transactions");
        assert!(stats.get("averageMs").is_some());
        assert!(stats.get("minMs").is_some());
        assert!(stats.get("maxMs").is_some());
        assert!(stats.get("p95Ms").is_some());
    }
}
