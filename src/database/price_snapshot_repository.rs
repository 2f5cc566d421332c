//! Append-only `PriceSnapshot` rows (§3), one per token per successful
//! oracle fetch. Only read by history queries — the oracle itself never
//! reads back through this repository (§4.1).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::error::DatabaseError;
use super::models::{PriceSnapshot, Token};

#[derive(Clone)]
pub struct PriceSnapshotRepository {
    pool: PgPool,
}

impl PriceSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        token: Token,
        price_usd: f64,
        price_ngn: f64,
        usd_to_ngn: f64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO price_snapshots (id, token, price_usd, price_ngn, usd_to_ngn, fetched_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, now())
            "#,
        )
        .bind(token)
        .bind(price_usd)
        .bind(price_ngn)
        .bind(usd_to_ngn)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn history(
        &self,
        token: Token,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceSnapshot>, DatabaseError> {
        let rows = sqlx::query_as::<_, PriceSnapshot>(
            r#"
            SELECT * FROM price_snapshots
            WHERE token = $1 AND fetched_at >= $2
            ORDER BY fetched_at DESC
            "#,
        )
        .bind(token)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
