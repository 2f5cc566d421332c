//! Transaction Store (C2): a thin repository over Postgres realizing the
//! document-store semantics of §4.2, most critically `ConditionalUpdate` — a
//! single atomic `UPDATE ... WHERE status = $expected RETURNING *` that the
//! settlement engine relies on for exactly-once status transitions.
//!
//! Grounded on the teacher's optimistic-locking `UPDATE ... WHERE status =
//! $1` pattern in `workers/offramp_processor.rs`, generalized from a
//! polling-worker's own writes to a request/event-driven engine's CAS.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use super::error::DatabaseError;
use super::models::{BankDetails, Direction, Token, Transaction, TxStatus};

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<TxStatus>,
    pub token: Option<Token>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStats {
    pub token: Token,
    pub direction: Direction,
    pub status: TxStatus,
    pub count: i64,
    pub total_ngn: i64,
}

#[derive(Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        reference: &str,
        token: Token,
        direction: Direction,
        token_amount: BigDecimal,
        ngn_amount: i64,
        fee_ngn: i64,
        rate_at_time: BigDecimal,
        sender_address: &str,
        recipient_address: &str,
        bank_details: Option<BankDetails>,
        expires_at: Option<DateTime<Utc>>,
        meta: JsonValue,
    ) -> Result<Transaction, DatabaseError> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                id, reference, token, direction, token_amount, ngn_amount, fee_ngn,
                rate_at_time, sender_address, recipient_address, status, bank_details,
                expires_at, meta, created_at, updated_at
            ) VALUES (
                gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10,
                $11, $12, now(), now()
            )
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(token)
        .bind(direction)
        .bind(token_amount)
        .bind(ngn_amount)
        .bind(fee_ngn)
        .bind(rate_at_time)
        .bind(sender_address)
        .bind(recipient_address)
        .bind(bank_details.map(sqlx::types::Json))
        .bind(expires_at)
        .bind(sqlx::types::Json(meta))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>, DatabaseError> {
        let row = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn find_by_id(&self, id: uuid::Uuid) -> Result<Option<Transaction>, DatabaseError> {
        let row = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn find_by_address(
        &self,
        address: &str,
        direction: Option<Direction>,
        filter: &HistoryFilter,
        page: i64,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let offset = (page.max(1) - 1) * limit;
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE sender_address = $1
              AND ($2::text IS NULL OR direction = $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::text IS NULL OR token = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(address)
        .bind(direction.map(|d| d.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.token.map(|t| t.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_by_address(
        &self,
        address: &str,
        direction: Option<Direction>,
        filter: &HistoryFilter,
    ) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE sender_address = $1
              AND ($2::text IS NULL OR direction = $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::text IS NULL OR token = $4)
            "#,
        )
        .bind(address)
        .bind(direction.map(|d| d.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.token.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// `GROUP BY token, direction, status` bucket counts and NGN sums (§4.2
    /// expansion), backing the supplemental `/api/offramp/stats` endpoint.
    pub async fn aggregate(&self) -> Result<Vec<TokenStats>, DatabaseError> {
        let rows = sqlx::query_as::<_, (Token, Direction, TxStatus, i64, Option<i64>)>(
            r#"
            SELECT token, direction, status, COUNT(*) as count, SUM(ngn_amount) as total_ngn
            FROM transactions
            GROUP BY token, direction, status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(token, direction, status, count, total_ngn)| TokenStats {
                token,
                direction,
                status,
                count,
                total_ngn: total_ngn.unwrap_or(0),
            })
            .collect())
    }

    /// The atomic find-and-modify primitive, §4.2/§4.8: `UPDATE ... WHERE
    /// reference = $1 AND status = $2 RETURNING *`. Returns `None` (not an
    /// error) when the precondition doesn't hold — the caller (the
    /// settlement engine) distinguishes "lost the race" from "genuine
    /// failure" by re-reading the record, per §4.8's `ConfirmReceipt` body.
    pub async fn conditional_transition(
        &self,
        reference: &str,
        required_status: TxStatus,
        next_status: TxStatus,
        chain_tx_id: Option<&str>,
        payout_provider_tx_id: Option<&str>,
        meta_patch: Option<JsonValue>,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Transaction>, DatabaseError> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $3,
                chain_tx_id = COALESCE($4, chain_tx_id),
                payout_provider_tx_id = COALESCE($5, payout_provider_tx_id),
                meta = CASE WHEN $6::jsonb IS NULL THEN meta ELSE meta || $6::jsonb END,
                confirmed_at = COALESCE($7, confirmed_at),
                updated_at = now()
            WHERE reference = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(required_status)
        .bind(next_status)
        .bind(chain_tx_id)
        .bind(payout_provider_tx_id)
        .bind(meta_patch)
        .bind(confirmed_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Set `chain_tx_id` on a still-`pending` record without changing status
    /// (used by `NotifyTxBroadcast`, §4.8). Returns `None` if the record is
    /// no longer `pending`.
    pub async fn attach_chain_tx_id(
        &self,
        reference: &str,
        chain_tx_id: &str,
    ) -> Result<Option<Transaction>, DatabaseError> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET chain_tx_id = $2, updated_at = now()
            WHERE reference = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(chain_tx_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Append-only merge into `meta` without a status change — used to record
    /// audit trail entries (balance snapshots, mismatch warnings) that are
    /// not themselves state transitions.
    pub async fn patch_meta(&self, reference: &str, patch: JsonValue) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE transactions SET meta = meta || $2::jsonb, updated_at = now() WHERE reference = $1")
            .bind(reference)
            .bind(patch)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Unfiltered-by-address listing for the generic admin record view
    /// (§6 ambient CRUD), paginated the same way as `find_by_address`.
    pub async fn list_all(
        &self,
        direction: Option<Direction>,
        filter: &HistoryFilter,
        page: i64,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let offset = (page.max(1) - 1) * limit;
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE ($1::text IS NULL OR direction = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR token = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(direction.map(|d| d.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.token.map(|t| t.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_all(&self, direction: Option<Direction>, filter: &HistoryFilter) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE ($1::text IS NULL OR direction = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR token = $3)
            "#,
        )
        .bind(direction.map(|d| d.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.token.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Unconditional admin status override — bypasses the state machine's CAS
    /// guard entirely. Reserved for the internal-key-gated admin endpoint;
    /// every other caller must go through `conditional_transition`.
    pub async fn set_status_admin(&self, id: uuid::Uuid, status: TxStatus) -> Result<Option<Transaction>, DatabaseError> {
        let row = sqlx::query_as::<_, Transaction>(
            "UPDATE transactions SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::super::models::TxStatus;

    #[test]
    fn conditional_transition_keys_on_required_status() {
        // The SQL predicate `WHERE reference = $1 AND status = $2` is the
        // entire exactly-once guarantee (§8 invariant 2) — exercised against
        // a live Postgres in the integration suite under `tests/`.
        assert!(TxStatus::Pending.can_transition_to(&TxStatus::Processing));
    }
}
