//! # Notification Outbox Repository
//!
//! Queue of notifications produced by committed order changes.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ORDER CHANGE (commit / refund / status)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← the order change is durable first                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue(kind, order_id, payload)   ← best effort, failures logged      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            NOTIFICATION DISPATCHER (settle-worker)              │   │
//! │  │  1. get_pending(limit, max_attempts)                            │   │
//! │  │  2. notify                                                      │   │
//! │  │     ok  ──► mark_delivered                                      │   │
//! │  │     err ──► mark_failed (attempts += 1, last_error)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  A lost notification never affects an order.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use settle_core::{NotificationKind, NotificationOutboxEntry};

#[derive(Debug, Clone)]
pub struct NotificationOutboxRepository {
    pool: SqlitePool,
}

impl NotificationOutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        NotificationOutboxRepository { pool }
    }

    /// Queues a notification for delivery.
    pub async fn enqueue(
        &self,
        kind: NotificationKind,
        order_id: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> DbResult<NotificationOutboxEntry> {
        let entry = NotificationOutboxEntry {
            id: Uuid::new_v4().to_string(),
            kind,
            order_id: order_id.to_string(),
            payload: payload.to_string(),
            attempts: 0,
            last_error: None,
            created_at: now,
            attempted_at: None,
            delivered_at: None,
        };

        debug!(kind = ?kind, order_id = %order_id, "Queuing notification");

        sqlx::query(
            r#"
            INSERT INTO notification_outbox (
                id, kind, order_id, payload,
                attempts, last_error, created_at, attempted_at, delivered_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.kind)
        .bind(&entry.order_id)
        .bind(&entry.payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.delivered_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Undelivered entries below the retry ceiling, oldest first.
    pub async fn get_pending(&self, limit: u32, max_attempts: u32) -> DbResult<Vec<NotificationOutboxEntry>> {
        let entries = sqlx::query_as::<_, NotificationOutboxEntry>(
            r#"
            SELECT id, kind, order_id, payload, attempts, last_error,
                   created_at, attempted_at, delivered_at
            FROM notification_outbox
            WHERE delivered_at IS NULL
              AND attempts < ?2
            ORDER BY julianday(created_at) ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn mark_delivered(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox SET
                delivered_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notification_outbox WHERE delivered_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Entries that hit the retry ceiling and will not be attempted again.
    pub async fn count_abandoned(&self, max_attempts: u32) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notification_outbox WHERE delivered_at IS NULL AND attempts >= ?1",
        )
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Deletes entries delivered more than `days_old` days before `now`.
    pub async fn cleanup_delivered(&self, days_old: u32, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM notification_outbox
            WHERE delivered_at IS NOT NULL
              AND julianday(delivered_at) < julianday(?2) - ?1
            "#,
        )
        .bind(days_old)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cod_order, test_db};
    use chrono::Duration;

    #[tokio::test]
    async fn test_enqueue_deliver_and_retry() {
        let db = test_db().await;
        let order = cod_order(&db).await;
        let repo = db.notifications();
        let now = Utc::now();

        let first = repo
            .enqueue(NotificationKind::OrderCreated, &order.id, "{}", now)
            .await
            .unwrap();
        let second = repo
            .enqueue(NotificationKind::StatusChanged, &order.id, "{}", now + Duration::seconds(1))
            .await
            .unwrap();

        let pending = repo.get_pending(10, 3).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);

        repo.mark_delivered(&first.id, now).await.unwrap();
        for _ in 0..3 {
            repo.mark_failed(&second.id, "smtp down", now).await.unwrap();
        }

        assert!(repo.get_pending(10, 3).await.unwrap().is_empty());
        assert_eq!(repo.count_pending().await.unwrap(), 1);
        assert_eq!(repo.count_abandoned(3).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_delivered() {
        let db = test_db().await;
        let order = cod_order(&db).await;
        let repo = db.notifications();
        let long_ago = Utc::now() - Duration::days(40);

        let entry = repo
            .enqueue(NotificationKind::OrderCreated, &order.id, "{}", long_ago)
            .await
            .unwrap();
        repo.mark_delivered(&entry.id, long_ago).await.unwrap();
        repo.enqueue(NotificationKind::Refunded, &order.id, "{}", Utc::now())
            .await
            .unwrap();

        assert_eq!(repo.cleanup_delivered(30, Utc::now()).await.unwrap(), 1);
        assert_eq!(repo.count_pending().await.unwrap(), 1);
    }
}
