//! # Refund Coordinator
//!
//! Refunds a paid order through its gateway, then records it locally.
//!
//! ```text
//! refund(order_id, amount?, reason)
//!   │
//!   ├─ already refunded ─────────────► AlreadyRefunded   (nothing changes)
//!   ├─ not paid / no payment id ─────► NotRefundable
//!   ├─ amount ∉ (0, total] ──────────► Validation
//!   │
//!   ├─ gateway.refund (key "refund-<order id>")
//!   │    └─ error ───────────────────► RefundFailed      (nothing changes)
//!   │
//!   └─ orders.refund (one transaction)
//!        status + payment → REFUNDED, stock restored, tracking appended
//!        └─ enqueue refunded notification
//! ```
//!
//! The idempotency key is derived from the order, so a retried call that
//! reaches the gateway twice cannot refund twice.

use std::sync::Arc;

use settle_core::validation::validate_refund_amount;
use settle_core::{Money, Order, OrderStatus, PaymentStatus, RefundInfo};
use settle_db::{Database, DbError};
use settle_gateway::{Gateways, RefundRequest};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::{CheckoutError, CheckoutResult};
use crate::notify::NotificationOutbox;

pub struct RefundCoordinator {
    db: Database,
    gateways: Gateways,
    outbox: NotificationOutbox,
    clock: Arc<dyn Clock>,
}

impl RefundCoordinator {
    pub fn new(db: Database, gateways: Gateways, clock: Arc<dyn Clock>) -> Self {
        let outbox = NotificationOutbox::new(&db);
        RefundCoordinator {
            db,
            gateways,
            outbox,
            clock,
        }
    }

    /// Refunds `amount` (the full total when `None`) of a paid order.
    pub async fn refund(&self, order_id: &str, amount: Option<Money>, reason: &str) -> CheckoutResult<Order> {
        let order = self
            .db
            .orders()
            .get(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))?;

        let (gateway_ref, payment_id) = refundable(&order)?;

        let amount = amount.unwrap_or_else(|| order.total());
        validate_refund_amount(amount.cents(), order.total_cents)?;

        let gateway = self.gateways.get(order.tender)?;
        let refund = gateway
            .refund(&RefundRequest {
                gateway_ref,
                gateway_payment_id: payment_id,
                amount,
                idempotency_key: format!("refund-{}", order.id),
                reason: reason.to_string(),
            })
            .await
            .map_err(|e| {
                warn!(order_id = %order.id, error = %e, "Gateway refused refund");
                CheckoutError::RefundFailed {
                    order_id: order.id.clone(),
                    reason: e.to_string(),
                }
            })?;

        let info = RefundInfo {
            amount_cents: refund.amount.cents(),
            refund_id: refund.refund_id,
            reason: reason.to_string(),
        };

        let now = self.clock.now();
        let refunded = match self.db.orders().refund(&order.id, &info, now).await {
            Ok(order) => order,
            Err(DbError::StatusConflict { .. }) => return Err(self.explain_lost_refund(&order.id).await),
            Err(e) => {
                error!(
                    order_id = %order.id,
                    refund_id = %info.refund_id,
                    error = %e,
                    "Gateway refunded but the order was not updated; needs manual reconciliation"
                );
                return Err(e.into());
            }
        };

        self.outbox.refunded(&refunded, &info, now).await;
        info!(order_id = %refunded.id, amount = info.amount_cents, "Refund completed");

        Ok(refunded)
    }

    /// The order changed between the checks and the write.
    async fn explain_lost_refund(&self, order_id: &str) -> CheckoutError {
        match self.db.orders().get(order_id).await {
            Ok(Some(order)) if order.status == OrderStatus::Refunded => CheckoutError::AlreadyRefunded {
                order_id: order_id.to_string(),
            },
            Ok(Some(order)) => CheckoutError::Conflict(format!(
                "order {order_id} is {} (payment {})",
                order.status, order.payment_status
            )),
            Ok(None) => CheckoutError::not_found("Order", order_id),
            Err(e) => e.into(),
        }
    }
}

/// Returns the gateway reference and payment id to refund against.
fn refundable(order: &Order) -> CheckoutResult<(String, String)> {
    let not_refundable = |reason: &str| CheckoutError::NotRefundable {
        order_id: order.id.clone(),
        reason: reason.to_string(),
    };

    if order.status == OrderStatus::Refunded || order.payment_status == PaymentStatus::Refunded {
        return Err(CheckoutError::AlreadyRefunded {
            order_id: order.id.clone(),
        });
    }
    if order.payment_status != PaymentStatus::Paid {
        return Err(not_refundable(&format!("payment is {}", order.payment_status)));
    }
    if !OrderStatus::refundable_from().contains(&order.status) {
        return Err(not_refundable(&format!("order is {}", order.status)));
    }

    match (&order.gateway_ref, &order.gateway_payment_id) {
        (Some(gateway_ref), Some(payment_id)) => Ok((gateway_ref.clone(), payment_id.clone())),
        _ => Err(not_refundable("no gateway payment on record")),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
