use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod collaborators;
mod config;
mod handlers;
mod metrics;
mod middleware;
mod mock_data;
mod redis_client;
mod server;

use config::Config;
use metrics::{MetricsBroadcaster, SampleRecorder, SnapshotBuilder};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Parsed process configuration (bind address, admin token, cadences).
    pub config: Config,

    /// Cloneable async Redis connection (auto-reconnects).
    pub redis: redis::aio::ConnectionManager,

    /// Central sample store: the interceptor pushes, snapshot reads.
    pub metrics: Arc<SampleRecorder>,

    /// Builds one immutable process snapshot per pull or broadcast tick.
    pub snapshots: Arc<SnapshotBuilder>,

    /// Fan-out channel feeding live dashboard subscribers.
    pub broadcaster: Arc<MetricsBroadcaster>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    // ── 1. Connect to Redis & seed demo data ────────────────────
    let redis = redis_client::connect(&config.redis_url).await?;
    if config.seed_demo_data {
        mock_data::seed(&redis).await?;
    }

    // ── 2. Wire the monitoring pipeline ─────────────────────────
    let recorder = Arc::new(SampleRecorder::new());
    let snapshots = Arc::new(SnapshotBuilder::new(
        Arc::clone(&recorder),
        Arc::new(collaborators::RedisSessionCounter::new(redis.clone())),
        Arc::new(collaborators::RedisDatabaseHealth::new(redis.clone())),
        config.collaborator_timeout,
    ));
    let broadcaster = Arc::new(MetricsBroadcaster::new());
    let broadcast_loop = tokio::spawn(
        Arc::clone(&broadcaster).run(Arc::clone(&snapshots), config.broadcast_interval),
    );

    if config.admin_token.is_none() {
        warn!("no admin token configured; the monitoring surface will reject every request");
    }

    // ── 3. Build shared state & router ──────────────────────────
    let state = Arc::new(AppState {
        config: config.clone(),
        redis,
        metrics: recorder,
        snapshots,
        broadcaster: Arc::clone(&broadcaster),
    });
    let app = server::create_router(state);

    // ── 4. Bind & serve until shutdown ──────────────────────────
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&broadcaster)))
        .await
        .context("server exited with error")?;

    broadcast_loop.await.context("broadcast loop panicked")?;
    Ok(())
}

/// Resolves on Ctrl-C. Cancels the broadcaster first so every live
/// subscriber stream ends and connections drain promptly.
async fn shutdown_signal(broadcaster: Arc<MetricsBroadcaster>) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
    broadcaster.shutdown();
}
