//! # Payment Intent Repository
//!
//! Persistence for payment intents: the snapshot stored at initiation and
//! read back at commit.
//!
//! ## Guarded Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE payment_intents SET status = :to, ...                           │
//! │  WHERE gateway_ref = :ref                                               │
//! │    AND status IN (IntentStatus::sources_of(:to))                        │
//! │                                                                         │
//! │  1 row  ──► moved                                                       │
//! │  0 rows ──► re-read: missing ──► NotFound                               │
//! │                      present ──► IntentNotClaimable { status }          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `VERIFIED → COMMITTED` claim is not here; it is the first statement
//! of the order commit transaction (see [`super::order`]).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use settle_core::{IntentStatus, PaymentIntent, Tender};

#[derive(Debug, sqlx::FromRow)]
struct IntentRow {
    gateway_ref: String,
    tender: Tender,
    status: IntentStatus,
    request: String,
    quote: String,
    buyer: String,
    gateway_payment_id: Option<String>,
    failure_reason: Option<String>,
    order_id: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IntentRow> for PaymentIntent {
    type Error = DbError;

    fn try_from(row: IntentRow) -> DbResult<Self> {
        Ok(PaymentIntent {
            gateway_ref: row.gateway_ref,
            tender: row.tender,
            status: row.status,
            request: serde_json::from_str(&row.request)?,
            quote: serde_json::from_str(&row.quote)?,
            buyer: serde_json::from_str(&row.buyer)?,
            gateway_payment_id: row.gateway_payment_id,
            failure_reason: row.failure_reason,
            order_id: row.order_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IntentRepository {
    pool: SqlitePool,
}

impl IntentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        IntentRepository { pool }
    }

    /// Stores a new intent. The gateway reference is the primary key.
    pub async fn insert(&self, intent: &PaymentIntent) -> DbResult<()> {
        debug!(gateway_ref = %intent.gateway_ref, tender = %intent.tender, "Storing payment intent");

        sqlx::query(
            r#"
            INSERT INTO payment_intents (
                gateway_ref, tender, status, request, quote, buyer, amount_cents,
                gateway_payment_id, failure_reason, order_id,
                created_at, expires_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&intent.gateway_ref)
        .bind(intent.tender)
        .bind(intent.status)
        .bind(serde_json::to_string(&intent.request)?)
        .bind(serde_json::to_string(&intent.quote)?)
        .bind(serde_json::to_string(&intent.buyer)?)
        .bind(intent.amount().cents())
        .bind(&intent.gateway_payment_id)
        .bind(&intent.failure_reason)
        .bind(&intent.order_id)
        .bind(intent.created_at)
        .bind(intent.expires_at)
        .bind(intent.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, gateway_ref: &str) -> DbResult<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, IntentRow>(
            r#"
            SELECT gateway_ref, tender, status, request, quote, buyer,
                   gateway_payment_id, failure_reason, order_id,
                   created_at, expires_at, updated_at
            FROM payment_intents
            WHERE gateway_ref = ?1
            "#,
        )
        .bind(gateway_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentIntent::try_from).transpose()
    }

    /// `PENDING | VERIFIED → VERIFIED`, recording the gateway payment id.
    pub async fn mark_verified(
        &self,
        gateway_ref: &str,
        gateway_payment_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        self.guarded_transition(gateway_ref, IntentStatus::Verified, gateway_payment_id, None, now)
            .await
    }

    /// `PENDING | VERIFIED → FAILED`, recording why.
    pub async fn mark_failed(&self, gateway_ref: &str, reason: &str, now: DateTime<Utc>) -> DbResult<()> {
        info!(gateway_ref = %gateway_ref, reason = %reason, "Payment intent failed");
        self.guarded_transition(gateway_ref, IntentStatus::Failed, None, Some(reason), now)
            .await
    }

    /// Moves every `PENDING` intent with `expires_at ≤ now` to `EXPIRED`.
    ///
    /// Returns the number of intents expired.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payment_intents SET
                status = 'expired',
                updated_at = ?1
            WHERE status = 'pending'
              AND julianday(expires_at) <= julianday(?1)
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_by_status(&self, status: IntentStatus) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payment_intents WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn guarded_transition(
        &self,
        gateway_ref: &str,
        to: IntentStatus,
        gateway_payment_id: Option<&str>,
        failure_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let sources = serde_json::to_string(&IntentStatus::sources_of(to))?;

        let result = sqlx::query(
            r#"
            UPDATE payment_intents SET
                status = ?2,
                gateway_payment_id = COALESCE(?3, gateway_payment_id),
                failure_reason = COALESCE(?4, failure_reason),
                updated_at = ?5
            WHERE gateway_ref = ?1
              AND status IN (SELECT value FROM json_each(?6))
            "#,
        )
        .bind(gateway_ref)
        .bind(to)
        .bind(gateway_payment_id)
        .bind(failure_reason)
        .bind(now)
        .bind(sources)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_rejection(gateway_ref).await);
        }

        debug!(gateway_ref = %gateway_ref, status = %to, "Payment intent moved");
        Ok(())
    }

    async fn explain_rejection(&self, gateway_ref: &str) -> DbError {
        let current = sqlx::query_scalar::<_, IntentStatus>(
            "SELECT status FROM payment_intents WHERE gateway_ref = ?1",
        )
        .bind(gateway_ref)
        .fetch_optional(&self.pool)
        .await;

        match current {
            Ok(Some(status)) => DbError::IntentNotClaimable {
                gateway_ref: gateway_ref.to_string(),
                status: status.to_string(),
            },
            Ok(None) => DbError::not_found("Payment intent", gateway_ref),
            Err(e) => e.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
