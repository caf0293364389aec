//! # Notifications
//!
//! Buyer notifications never run inside a commit. Services enqueue an
//! outbox row after the write succeeds; the dispatcher delivers later.
//!
//! ```text
//! ┌────────────────────┐  enqueue (best effort)  ┌──────────────────────┐
//! │ commit / refund /  │ ──────────────────────► │ notification_outbox  │
//! │ status transition  │                         │ attempts, last_error │
//! └────────────────────┘                         └──────────┬───────────┘
//!                                                           │ get_pending
//!                                                           ▼
//!                                               ┌──────────────────────┐
//!                                               │ NotificationDispatcher│
//!                                               │  ├─ Ok  → delivered  │
//!                                               │  └─ Err → attempts+1 │
//!                                               └──────────┬───────────┘
//!                                                          ▼
//!                                                     dyn Notifier
//! ```
//!
//! An entry that reaches `max_attempts` is left in place and reported as
//! abandoned; it is never retried again.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use settle_core::{NotificationKind, NotificationOutboxEntry, Order, OrderStatus, RefundInfo};
use settle_db::{Database, NotificationOutboxRepository};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::WorkerSettings;
use crate::error::CheckoutResult;

/// Delivery failure reported by a [`Notifier`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Delivers buyer-facing notifications (email, SMS, webhook).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_order_created(&self, order: &Order) -> Result<(), NotifyError>;

    async fn notify_status_changed(&self, order: &Order, from: OrderStatus, to: OrderStatus)
        -> Result<(), NotifyError>;

    async fn notify_refunded(&self, order: &Order, refund: &RefundInfo) -> Result<(), NotifyError>;
}

/// Writes each notification to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_order_created(&self, order: &Order) -> Result<(), NotifyError> {
        info!(
            order_number = %order.order_number,
            email = %order.buyer.email,
            total = order.total_cents,
            "Order confirmation"
        );
        Ok(())
    }

    async fn notify_status_changed(
        &self,
        order: &Order,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<(), NotifyError> {
        info!(order_number = %order.order_number, email = %order.buyer.email, %from, %to, "Order status update");
        Ok(())
    }

    async fn notify_refunded(&self, order: &Order, refund: &RefundInfo) -> Result<(), NotifyError> {
        info!(
            order_number = %order.order_number,
            email = %order.buyer.email,
            amount = refund.amount_cents,
            "Refund confirmation"
        );
        Ok(())
    }
}

// =============================================================================
// Outbox Writer
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StatusChange {
    from: OrderStatus,
    to: OrderStatus,
}

/// Enqueues notifications after a successful write.
///
/// Enqueue failures are logged and swallowed; the write they follow has
/// already committed.
#[derive(Debug, Clone)]
pub struct NotificationOutbox {
    repo: NotificationOutboxRepository,
}

impl NotificationOutbox {
    pub fn new(db: &Database) -> Self {
        NotificationOutbox {
            repo: db.notifications(),
        }
    }

    pub async fn order_created(&self, order: &Order, now: DateTime<Utc>) {
        self.enqueue(NotificationKind::OrderCreated, &order.id, "{}".to_string(), now)
            .await;
    }

    pub async fn status_changed(&self, order: &Order, from: OrderStatus, to: OrderStatus, now: DateTime<Utc>) {
        match serde_json::to_string(&StatusChange { from, to }) {
            Ok(payload) => {
                self.enqueue(NotificationKind::StatusChanged, &order.id, payload, now)
                    .await
            }
            Err(e) => warn!(order_id = %order.id, error = %e, "Could not encode status notification"),
        }
    }

    pub async fn refunded(&self, order: &Order, refund: &RefundInfo, now: DateTime<Utc>) {
        match serde_json::to_string(refund) {
            Ok(payload) => self.enqueue(NotificationKind::Refunded, &order.id, payload, now).await,
            Err(e) => warn!(order_id = %order.id, error = %e, "Could not encode refund notification"),
        }
    }

    async fn enqueue(&self, kind: NotificationKind, order_id: &str, payload: String, now: DateTime<Utc>) {
        if let Err(e) = self.repo.enqueue(kind, order_id, &payload, now).await {
            warn!(order_id = %order_id, ?kind, error = %e, "Failed to enqueue notification");
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: u32,
    pub failed: u32,
    /// Failures that used up the last attempt.
    pub abandoned: u32,
}

pub struct NotificationDispatcher {
    db: Database,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    batch_size: u32,
    max_attempts: u32,
    retention_days: u32,
}

impl NotificationDispatcher {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, settings: &WorkerSettings) -> Self {
        NotificationDispatcher {
            db,
            notifier,
            clock,
            batch_size: settings.batch_size,
            max_attempts: settings.max_attempts,
            retention_days: settings.retention_days,
        }
    }

    /// Delivers up to one batch of pending notifications.
    pub async fn dispatch_pending(&self) -> CheckoutResult<DispatchReport> {
        let outbox = self.db.notifications();
        let entries = outbox.get_pending(self.batch_size, self.max_attempts).await?;
        let mut report = DispatchReport::default();

        for entry in entries {
            let now = self.clock.now();
            match self.deliver(&entry).await {
                Ok(()) => {
                    outbox.mark_delivered(&entry.id, now).await?;
                    report.delivered += 1;
                }
                Err(reason) => {
                    outbox.mark_failed(&entry.id, &reason, now).await?;
                    report.failed += 1;

                    let attempts = entry.attempts + 1;
                    if attempts >= i64::from(self.max_attempts) {
                        report.abandoned += 1;
                        warn!(
                            entry_id = %entry.id,
                            order_id = %entry.order_id,
                            kind = ?entry.kind,
                            attempts,
                            error = %reason,
                            "Notification abandoned"
                        );
                    } else {
                        debug!(entry_id = %entry.id, attempts, error = %reason, "Notification delivery failed");
                    }
                }
            }
        }

        if report.delivered + report.failed > 0 {
            info!(
                delivered = report.delivered,
                failed = report.failed,
                abandoned = report.abandoned,
                "Notification dispatch pass"
            );
        }

        Ok(report)
    }

    /// Deletes delivered entries older than the retention window.
    pub async fn cleanup(&self) -> CheckoutResult<u64> {
        let removed = self
            .db
            .notifications()
            .cleanup_delivered(self.retention_days, self.clock.now())
            .await?;
        if removed > 0 {
            debug!(removed, "Cleaned up delivered notifications");
        }
        Ok(removed)
    }

    async fn deliver(&self, entry: &NotificationOutboxEntry) -> Result<(), String> {
        let order = match self.db.orders().get(&entry.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return Err(format!("order {} not found", entry.order_id)),
            Err(e) => return Err(e.to_string()),
        };

        let sent = match entry.kind {
            NotificationKind::OrderCreated => self.notifier.notify_order_created(&order).await,
            NotificationKind::StatusChanged => {
                let change: StatusChange = serde_json::from_str(&entry.payload).map_err(|e| e.to_string())?;
                self.notifier.notify_status_changed(&order, change.from, change.to).await
            }
            NotificationKind::Refunded => {
                let refund: RefundInfo = serde_json::from_str(&entry.payload).map_err(|e| e.to_string())?;
                self.notifier.notify_refunded(&order, &refund).await
            }
        };

        sent.map_err(|e| e.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, RecordingNotifier};

    fn dispatcher(h: &Harness, notifier: Arc<RecordingNotifier>, max_attempts: u32) -> NotificationDispatcher {
        let settings = WorkerSettings {
            max_attempts,
            batch_size: 10,
            ..WorkerSettings::default()
        };
        NotificationDispatcher::new(h.db.clone(), notifier, h.clock.clone(), &settings)
    }

    #[tokio::test]
    async fn test_commit_enqueues_and_dispatch_delivers() {
        let h = Harness::new().await;
        h.seed_single(5).await;
        let order = h.paid_order(1).await;

        let notifier = Arc::new(RecordingNotifier::default());
        let report = dispatcher(&h, notifier.clone(), 10).dispatch_pending().await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(notifier.events(), vec![format!("created:{}", order.order_number)]);
        assert_eq!(h.db.notifications().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_retries_until_ceiling() {
        let h = Harness::new().await;
        h.seed_single(5).await;
        h.paid_order(1).await;

        let notifier = Arc::new(RecordingNotifier::default());
        notifier.set_failing(true);
        let dispatcher = dispatcher(&h, notifier.clone(), 2);

        let first = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!((first.failed, first.abandoned), (1, 0));

        let second = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!((second.failed, second.abandoned), (1, 1));

        // Past the ceiling: skipped even once the notifier recovers.
        notifier.set_failing(false);
        let third = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(third, DispatchReport::default());
        assert!(notifier.events().is_empty());
        assert_eq!(h.db.notifications().count_abandoned(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_status_and_refund_payloads_round_trip() {
        let h = Harness::new().await;
        h.seed_single(5).await;
        let order = h.paid_order(1).await;

        h.orders()
            .transition(&order.id, OrderStatus::Processing, None)
            .await
            .unwrap();
        h.refunds().refund(&order.id, None, "damaged").await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let report = dispatcher(&h, notifier.clone(), 10).dispatch_pending().await.unwrap();

        assert_eq!(report.delivered, 3);
        let events = notifier.events();
        assert!(events.contains(&format!("status:{}:confirmed->processing", order.order_number)));
        assert!(events.contains(&format!("refunded:{}:1000", order.order_number)));
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_everything() {
        let h = Harness::new().await;
        h.seed_single(5).await;
        h.paid_order(2).await;

        let dispatcher = NotificationDispatcher::new(
            h.db.clone(),
            Arc::new(LogNotifier),
            h.clock.clone(),
            &WorkerSettings::default(),
        );
        assert_eq!(dispatcher.dispatch_pending().await.unwrap().delivered, 1);
        assert_eq!(dispatcher.cleanup().await.unwrap(), 0);
    }
}
