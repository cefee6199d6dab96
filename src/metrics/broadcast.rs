//! Live fan-out of process snapshots to authorized dashboard clients.
//!
//! A background loop builds one snapshot per tick and pushes it through
//! a broadcast channel; each SSE connection holds a receiver plus a
//! registry guard. Delivery failures (including a receiver lagging the
//! channel buffer) drop only that subscriber.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::snapshot::{ProcessSnapshot, SnapshotBuilder};
use crate::auth::{Principal, Role};
use crate::AppState;

// ─── Configuration ───────────────────────────────────────────────

/// Pushes a slow subscriber may fall behind before it is dropped.
const SUBSCRIBER_BUFFER: usize = 8;

/// SSE comment cadence that keeps idle proxies from closing the pipe.
const KEEP_ALIVE_SECS: u64 = 15;

/// Event name dashboard clients listen for.
const METRICS_EVENT: &str = "ReceiveMetrics";

// ─── Channel payload ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Push {
    Snapshot(Arc<ProcessSnapshot>),
    /// Terminal signal: the broadcaster is stopping, streams should end.
    Shutdown,
}

// ─── Subscriber bookkeeping ──────────────────────────────────────

/// Connection bookkeeping for one live subscriber. No business state
/// lives here; the registry exists for logs and the cycle's "anyone
/// listening?" check.
#[derive(Debug)]
struct Subscriber {
    role: Role,
    connected_at: DateTime<Utc>,
    last_push_at: Option<DateTime<Utc>>,
    pushes: u64,
}

/// Removes its registry entry when the subscriber's stream is dropped,
/// whatever the reason (client close, transport failure, lag).
pub struct SubscriberGuard {
    id: Uuid,
    channel: Arc<MetricsBroadcaster>,
}

impl SubscriberGuard {
    fn mark_push(&self) {
        if let Some(mut subscriber) = self.channel.registry.get_mut(&self.id) {
            subscriber.last_push_at = Some(Utc::now());
            subscriber.pushes += 1;
        }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        if let Some((id, subscriber)) = self.channel.registry.remove(&self.id) {
            info!(
                connection_id = %id,
                role = ?subscriber.role,
                pushes = subscriber.pushes,
                last_push_at = ?subscriber.last_push_at,
                connected_secs = (Utc::now() - subscriber.connected_at).num_seconds(),
                "dashboard subscriber disconnected"
            );
        }
    }
}

// ─── MetricsBroadcaster ──────────────────────────────────────────

/// Owns the snapshot fan-out: the broadcast sender, the subscriber
/// registry, and the shutdown token for the background loop.
pub struct MetricsBroadcaster {
    tx: broadcast::Sender<Push>,
    registry: DashMap<Uuid, Subscriber>,
    shutdown: CancellationToken,
}

impl MetricsBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            tx,
            registry: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a verified principal as a live subscriber. Callers must
    /// have passed the admin boundary already; this hands out the
    /// receiving end and the registry guard.
    pub fn subscribe(self: Arc<Self>, role: Role) -> (SubscriberGuard, broadcast::Receiver<Push>) {
        let id = Uuid::new_v4();
        self.registry.insert(
            id,
            Subscriber {
                role,
                connected_at: Utc::now(),
                last_push_at: None,
                pushes: 0,
            },
        );
        let rx = self.tx.subscribe();
        info!(connection_id = %id, role = ?role, "dashboard subscriber live");
        (SubscriberGuard { id, channel: self }, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Request cooperative shutdown of the broadcast loop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Background cycle: every `cadence`, build one snapshot and fan it
    /// out to every live subscriber. Runs until [`shutdown`] is called.
    ///
    /// [`shutdown`]: MetricsBroadcaster::shutdown
    pub async fn run(self: Arc<Self>, builder: Arc<SnapshotBuilder>, cadence: Duration) {
        let mut ticker = interval(cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(cadence_ms = cadence.as_millis() as u64, "metrics broadcaster started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    // Wake every stream so connections close promptly.
                    let _ = self.tx.send(Push::Shutdown);
                    info!("metrics broadcaster stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if self.subscriber_count() == 0 {
                        continue;
                    }
                    let snapshot = Arc::new(builder.build().await);
                    // Fails only if every receiver vanished since the check.
                    let _ = self.tx.send(Push::Snapshot(snapshot));
                }
            }
        }
    }
}

// ─── GET /api/admin/metrics ──────────────────────────────────────
/// One-shot pull of the current snapshot. The admin middleware has
/// already vetted the caller; nothing is computed before that.

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<ProcessSnapshot> {
    Json(state.snapshots.build().await)
}

// ─── GET /api/admin/metrics/stream ───────────────────────────────
/// Server-Sent Events endpoint. After the authorized handshake the
/// server emits a named event carrying the snapshot JSON on every
/// broadcast cycle until the connection closes.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (guard, rx) = Arc::clone(&state.broadcaster).subscribe(principal.role);

    let stream = BroadcastStream::new(rx)
        // A lagged receiver is a failed subscriber: end its stream
        // rather than stall the shared cycle. Shutdown ends it too.
        .take_while(|push| matches!(push, Ok(Push::Snapshot(_))))
        .filter_map(move |push| {
            let Ok(Push::Snapshot(snapshot)) = push else {
                return None;
            };
            guard.mark_push();
            match serde_json::to_string(&*snapshot) {
                Ok(json) => Some(Ok(Event::default().event(METRICS_EVENT).data(json))),
                Err(error) => {
                    warn!(%error, "failed to serialize snapshot for push");
                    None
                }
            }
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("keep-alive"),
    )
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::snapshot::testing::{StubDb, StubSessions};
    use crate::metrics::{Sample, SampleRecorder};

    fn test_builder() -> Arc<SnapshotBuilder> {
        let recorder = Arc::new(SampleRecorder::new());
        recorder.record(Sample::new("GET /api/budgets/:id", 12.0));
        Arc::new(SnapshotBuilder::new(
            recorder,
            Arc::new(StubSessions { active: 1, total: 2 }),
            Arc::new(StubDb),
            Duration::from_millis(250),
        ))
    }

    #[tokio::test]
    async fn subscribe_registers_and_drop_unregisters() {
        let broadcaster = Arc::new(MetricsBroadcaster::new());
        let (guard, rx) = Arc::clone(&broadcaster).subscribe(Role::Admin);
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(rx);
        drop(guard);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_continues_after_a_subscriber_drops() {
        let broadcaster = Arc::new(MetricsBroadcaster::new());
        let loop_handle = tokio::spawn(
            Arc::clone(&broadcaster).run(test_builder(), Duration::from_millis(100)),
        );

        let (guard_a, mut rx_a) = Arc::clone(&broadcaster).subscribe(Role::Admin);
        let (guard_b, rx_b) = Arc::clone(&broadcaster).subscribe(Role::Admin);
        assert_eq!(broadcaster.subscriber_count(), 2);

        let first = rx_a.recv().await.expect("first push");
        let Push::Snapshot(snapshot) = first else {
            panic!("expected a snapshot push");
        };
        assert_eq!(snapshot.tracked_endpoints, 1);

        // One subscriber going away must not affect the next cycle.
        drop(rx_b);
        drop(guard_b);
        assert_eq!(broadcaster.subscriber_count(), 1);

        let next = rx_a.recv().await.expect("push after peer dropped");
        assert!(matches!(next, Push::Snapshot(_)));

        broadcaster.shutdown();
        loop {
            match rx_a.recv().await {
                Ok(Push::Shutdown) | Err(_) => break,
                Ok(Push::Snapshot(_)) => continue,
            }
        }
        loop_handle.await.expect("broadcast loop");
        drop(guard_a);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_cycle_skips_snapshot_builds() {
        let broadcaster = Arc::new(MetricsBroadcaster::new());
        let loop_handle = tokio::spawn(
            Arc::clone(&broadcaster).run(test_builder(), Duration::from_millis(50)),
        );

        // Let several ticks pass with nobody listening, then connect.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let (guard, mut rx) = Arc::clone(&broadcaster).subscribe(Role::Admin);

        // The first push arrives fresh; the subscriber never lags on
        // ticks from before it connected.
        let push = rx.recv().await.expect("push");
        assert!(matches!(push, Push::Snapshot(_)));

        broadcaster.shutdown();
        drop(guard);
        loop_handle.await.expect("broadcast loop");
    }
}
