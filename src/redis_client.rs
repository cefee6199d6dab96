use anyhow::Context;
use redis::aio::ConnectionManager;
use tracing::info;

/// Creates a single `ConnectionManager` that auto-reconnects on failure.
///
/// `ConnectionManager` is cheaply cloneable; every clone shares the same
/// underlying multiplexed TCP connection, which is plenty for this
/// workload. A real deployment would front it with a pool.
pub async fn connect(url: &str) -> anyhow::Result<ConnectionManager> {
    let client =
        redis::Client::open(url).with_context(|| format!("invalid Redis URL {url:?}"))?;

    let conn = ConnectionManager::new(client)
        .await
        .with_context(|| format!("cannot connect to Redis at {url}"))?;

    info!(%url, "connected to Redis");
    Ok(conn)
}
