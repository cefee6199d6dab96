//! Demo data seeding so a fresh process has entities to count and list.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use redis::aio::ConnectionManager;
use std::time::Instant;
use tracing::info;

// ─── Constants ───────────────────────────────────────────────────

const NUM_TRANSACTIONS: usize = 400;
const NUM_BUDGETS: usize = 24;
/// Pipeline batch size; keeps Redis buffers comfortable.
const BATCH: usize = 200;
/// Ids retained in the recent-transactions index.
const RECENT_INDEX_LEN: i64 = 100;

// ─── Value pools ─────────────────────────────────────────────────

static MERCHANTS: &[&str] = &[
    "Corner Grocer",
    "Transit Authority",
    "Cloud Kitchen",
    "City Utilities",
    "Night Owl Cafe",
    "Streamline Media",
    "Fresh Fields Market",
    "Downtown Parking",
    "Neighborhood Pharmacy",
    "Rail Express",
    "Harbor Bistro",
    "Peak Fitness",
    "Metro Hardware",
    "Book Nook",
    "Green Thumb Nursery",
    "Iron Skillet Diner",
    "Quick Lube Garage",
    "Sunset Cinemas",
    "Riverside Florist",
    "Summit Outfitters",
];

static CATEGORIES: &[&str] = &[
    "groceries",
    "dining",
    "transport",
    "utilities",
    "entertainment",
    "travel",
    "health",
    "rent",
    "subscriptions",
    "misc",
];

// ─── Public entry point ──────────────────────────────────────────

/// Seeds transactions and budgets, then stamps the entity counters the
/// health report serves. Idempotent: a second run is a no-op.
pub async fn seed(conn: &ConnectionManager) -> anyhow::Result<()> {
    let mut conn = conn.clone();

    let already: Option<String> = redis::cmd("GET")
        .arg("seed:complete")
        .query_async(&mut conn)
        .await?;
    if already.is_some() {
        info!("demo data already present, skipping seed");
        return Ok(());
    }

    let start = Instant::now();
    info!(
        transactions = NUM_TRANSACTIONS,
        budgets = NUM_BUDGETS,
        "seeding demo data into Redis"
    );

    // Deterministic RNG so re-runs produce the same data.
    let mut rng = StdRng::seed_from_u64(42);

    seed_transactions(&mut conn, &mut rng).await?;
    seed_budgets(&mut conn, &mut rng).await?;

    let mut pipe = redis::pipe();
    pipe.cmd("LTRIM")
        .arg("transactions:recent")
        .arg(0)
        .arg(RECENT_INDEX_LEN - 1)
        .ignore();
    pipe.cmd("SET")
        .arg("count:transactions")
        .arg(NUM_TRANSACTIONS)
        .ignore();
    pipe.cmd("SET").arg("count:budgets").arg(NUM_BUDGETS).ignore();
    pipe.cmd("SET")
        .arg("seed:complete")
        .arg(chrono::Utc::now().to_rfc3339())
        .ignore();
    let _: () = pipe.query_async(&mut conn).await?;

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "seed complete");
    Ok(())
}

// ─── Transactions ────────────────────────────────────────────────

async fn seed_transactions(
    conn: &mut ConnectionManager,
    rng: &mut StdRng,
) -> anyhow::Result<()> {
    let today = chrono::Utc::now().date_naive();

    for batch_start in (0..NUM_TRANSACTIONS).step_by(BATCH) {
        let batch_end = (batch_start + BATCH).min(NUM_TRANSACTIONS);
        let mut pipe = redis::pipe();

        for i in batch_start..batch_end {
            let id = format!("txn_{:06}", i + 1);
            let key = format!("transaction:{}", id);

            let merchant = MERCHANTS[rng.gen_range(0..MERCHANTS.len())];
            let category = CATEGORIES[rng.gen_range(0..CATEGORIES.len())];
            let amount_cents = rng.gen_range(150..=25_000i64);
            let days_ago = rng.gen_range(0..90u64);
            let occurred_on = today
                .checked_sub_days(chrono::Days::new(days_ago))
                .unwrap_or(today)
                .format("%Y-%m-%d")
                .to_string();

            pipe.cmd("HSET")
                .arg(&key)
                .arg("id")
                .arg(&id)
                .arg("description")
                .arg(merchant)
                .arg("amount_cents")
                .arg(amount_cents)
                .arg("category")
                .arg(category)
                .arg("occurred_on")
                .arg(&occurred_on)
                .arg("created_at")
                .arg("2026-01-05T08:14:02Z")
                .ignore();
            pipe.cmd("LPUSH").arg("transactions:recent").arg(&id).ignore();
        }

        let _: () = pipe.query_async(conn).await?;
    }

    Ok(())
}

// ─── Budgets ─────────────────────────────────────────────────────

async fn seed_budgets(conn: &mut ConnectionManager, rng: &mut StdRng) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    let this_month = now.format("%Y-%m").to_string();
    let last_month = now
        .date_naive()
        .checked_sub_months(chrono::Months::new(1))
        .map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_else(|| this_month.clone());

    let mut pipe = redis::pipe();

    for i in 0..NUM_BUDGETS {
        let id = format!("bud_{:04}", i + 1);
        let key = format!("budget:{}", id);

        let category = CATEGORIES[i % CATEGORIES.len()];
        let month = if i < NUM_BUDGETS / 2 { &this_month } else { &last_month };
        let limit_cents = rng.gen_range(10_000..=150_000i64);

        pipe.cmd("HSET")
            .arg(&key)
            .arg("id")
            .arg(&id)
            .arg("category")
            .arg(category)
            .arg("limit_cents")
            .arg(limit_cents)
            .arg("month")
            .arg(month)
            .arg("created_at")
            .arg("2026-01-05T08:14:02Z")
            .ignore();
    }

    let _: () = pipe.query_async(conn).await?;
    Ok(())
}
