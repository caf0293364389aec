//! # Order Status Service
//!
//! Fulfilment moves an order forward one checked step at a time.
//!
//! ```text
//! PENDING ──► CONFIRMED ──► PROCESSING ──► SHIPPED ──► DELIVERED
//!    │            │              │
//!    └────────────┴──────────────┴──► CANCELLED   (unpaid only, stock back)
//!
//! REFUNDED is entered only through RefundCoordinator.
//! ```
//!
//! Every accepted move appends a tracking event and enqueues a
//! status notification.

use std::sync::Arc;

use settle_core::{Order, OrderStatus, PaymentStatus};
use settle_db::Database;
use tracing::info;

use crate::clock::Clock;
use crate::error::{CheckoutError, CheckoutResult};
use crate::notify::NotificationOutbox;

pub struct OrderStatusService {
    db: Database,
    outbox: NotificationOutbox,
    clock: Arc<dyn Clock>,
}

impl OrderStatusService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        let outbox = NotificationOutbox::new(&db);
        OrderStatusService { db, outbox, clock }
    }

    pub async fn get(&self, order_id: &str) -> CheckoutResult<Order> {
        self.db
            .orders()
            .get(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))
    }

    pub async fn get_by_number(&self, order_number: &str) -> CheckoutResult<Order> {
        self.db
            .orders()
            .get_by_number(order_number)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_number))
    }

    /// Moves `order_id` to `to`, recording `note` (or a default) on the
    /// tracking timeline.
    pub async fn transition(&self, order_id: &str, to: OrderStatus, note: Option<&str>) -> CheckoutResult<Order> {
        let order = self.get(order_id).await?;
        let from = order.status;

        from.ensure_transition(to)?;

        if to == OrderStatus::Cancelled && order.payment_status == PaymentStatus::Paid {
            return Err(CheckoutError::InvalidTransition {
                entity: "order".to_string(),
                from: format!("{from} (paid)"),
                to: to.to_string(),
            });
        }

        let note = note.map_or_else(|| format!("Status changed to {to}"), str::to_string);
        let now = self.clock.now();
        let updated = self.db.orders().transition(order_id, from, to, &note, now).await?;

        self.outbox.status_changed(&updated, from, to, now).await;
        info!(order_id = %order_id, %from, %to, "Order status changed");

        Ok(updated)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
