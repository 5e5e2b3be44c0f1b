use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use common::{Error, Order, Pair, PairCycle, Result, Store};

/// SQLite-backed store. Records are kept as JSON payloads next to the
/// columns used for filtering.
pub struct SqliteStore {
    db: SqlitePool,
    session_orders: AtomicU64,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let db = SqlitePool::connect_with(options).await?;
        Self::migrated(db).await
    }

    /// A private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database.
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrated(db).await
    }

    async fn migrated(db: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .map_err(|e| Error::Database(e.into()))?;
        info!("Database ready");
        Ok(Self {
            db,
            session_orders: AtomicU64::new(0),
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode<T: serde::de::DeserializeOwned>(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<T>> {
    rows.iter()
        .map(|row| {
            let payload: String = row.try_get("payload")?;
            Ok(serde_json::from_str(&payload)?)
        })
        .collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_pair_cycle(&self, pair: &Pair, cycle: &PairCycle, keep: usize) -> Result<()> {
        let pair = pair.to_string();
        let payload = serde_json::to_string(cycle)?;
        let mut tx = self.db.begin().await?;

        sqlx::query("INSERT INTO pair_cycles (pair, started_at, payload) VALUES (?1, ?2, ?3)")
            .bind(&pair)
            .bind(timestamp(cycle.started_at))
            .bind(payload)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM pair_cycles
            WHERE pair = ?1 AND id NOT IN (
                SELECT id FROM pair_cycles WHERE pair = ?1 ORDER BY id DESC LIMIT ?2
            )
            "#,
        )
        .bind(&pair)
        .bind(keep as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO pair_cycle_counts (pair, total) VALUES (?1, 1)
            ON CONFLICT(pair) DO UPDATE SET total = total + 1
            "#,
        )
        .bind(&pair)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn pair_cycles(&self, pair: &Pair) -> Result<Vec<PairCycle>> {
        let rows = sqlx::query("SELECT payload FROM pair_cycles WHERE pair = ?1 ORDER BY id")
            .bind(pair.to_string())
            .fetch_all(&self.db)
            .await?;
        decode(rows)
    }

    async fn save_pair_order(&self, pair: &Pair, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pair_orders (id, pair, created_at, payload) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET payload = excluded.payload
            "#,
        )
        .bind(&order.id)
        .bind(pair.to_string())
        .bind(timestamp(order.created_at))
        .bind(serde_json::to_string(order)?)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn pair_orders(
        &self,
        pair: &Pair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM pair_orders
            WHERE pair = ?1 AND created_at >= ?2 AND created_at <= ?3
            ORDER BY created_at
            "#,
        )
        .bind(pair.to_string())
        .bind(timestamp(start))
        .bind(timestamp(end))
        .fetch_all(&self.db)
        .await?;
        decode(rows)
    }

    async fn orders(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM pair_orders
            WHERE created_at >= ?1 AND created_at <= ?2
            ORDER BY created_at
            "#,
        )
        .bind(timestamp(start))
        .bind(timestamp(end))
        .fetch_all(&self.db)
        .await?;
        decode(rows)
    }

    async fn order_count(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pair_orders WHERE created_at >= ?1 AND created_at <= ?2",
        )
        .bind(timestamp(start))
        .bind(timestamp(end))
        .fetch_one(&self.db)
        .await?;
        Ok(count as usize)
    }

    async fn cycle_count(&self, pair: &Pair) -> Result<u64> {
        let total: Option<i64> =
            sqlx::query_scalar("SELECT total FROM pair_cycle_counts WHERE pair = ?1")
                .bind(pair.to_string())
                .fetch_optional(&self.db)
                .await?;
        Ok(total.unwrap_or(0) as u64)
    }

    fn session_orders(&self) -> u64 {
        self.session_orders.load(Ordering::SeqCst)
    }

    fn increment_session_orders(&self) {
        self.session_orders.fetch_add(1, Ordering::SeqCst);
    }

    fn reset_session_orders(&self) {
        self.session_orders.store(0, Ordering::SeqCst);
    }
}
