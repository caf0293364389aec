//! # Order Repository
//!
//! Durable orders and the three transactions that touch them.
//!
//! ## Commit Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION (commit)                           │
//! │                                                                         │
//! │  1. CLAIM   UPDATE payment_intents SET status = 'committed'             │
//! │             WHERE gateway_ref = ? AND status = 'verified'               │
//! │             0 rows ──► ROLLBACK ──► winner's order? AlreadyCommitted    │
//! │                                     none?           IntentNotClaimable  │
//! │             (skipped for cash on delivery)                              │
//! │                                                                         │
//! │  2. STOCK   UPDATE product_variants SET stock = stock - :qty            │
//! │             WHERE id = ? AND stock >= :qty        (per variant)         │
//! │             0 rows ──► ROLLBACK ──► InsufficientStock                   │
//! │                                                                         │
//! │  3. COUPON  UPDATE coupons SET used_count = used_count + 1              │
//! │             WHERE id = ? AND (usage_limit IS NULL                       │
//! │                               OR used_count < usage_limit)              │
//! │             0 rows ──► ROLLBACK ──► CouponExhausted                     │
//! │                                                                         │
//! │  4. INSERT  orders + order_items + order_tracking                       │
//! │             UNIQUE(gateway_ref) backs up step 1                         │
//! │                                                                         │
//! │  COMMIT ← all or nothing                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Refund / Status Transactions
//! Both open with a compare-and-set on the order's status columns, then
//! restore stock where needed and append a tracking event.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use settle_core::{
    BuyerInfo, Order, OrderItem, OrderStatus, PaymentStatus, Quote, RefundInfo, Tender, TenderTier,
    TrackingEvent,
};

// =============================================================================
// Inputs & Outcomes
// =============================================================================

/// Everything needed to materialize an order from a recomputed quote.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub quote: Quote,
    pub buyer: BuyerInfo,
    pub tender: Tender,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Set for gateway tenders: the intent to claim.
    pub gateway_ref: Option<String>,
    pub gateway_payment_id: Option<String>,
    /// Note on the initial tracking event.
    pub note: String,
}

/// Result of a commit attempt that did not fail.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// This call created the order.
    Created(Order),
    /// Another call already committed this gateway reference.
    AlreadyCommitted(Order),
}

impl CommitOutcome {
    pub fn order(&self) -> &Order {
        match self {
            CommitOutcome::Created(order) | CommitOutcome::AlreadyCommitted(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            CommitOutcome::Created(order) | CommitOutcome::AlreadyCommitted(order) => order,
        }
    }
}

// =============================================================================
// Rows
// =============================================================================

const ORDER_COLUMNS: &str = "id, order_number, status, payment_status, tender, tier, \
     gateway_ref, gateway_payment_id, buyer_name, buyer_email, buyer_phone, shipping_address, \
     subtotal_cents, quantity_savings_cents, coupon_id, coupon_code, coupon_discount_cents, \
     shipping_cents, total_cents, refund_amount_cents, refund_id, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    status: OrderStatus,
    payment_status: PaymentStatus,
    tender: Tender,
    tier: TenderTier,
    gateway_ref: Option<String>,
    gateway_payment_id: Option<String>,
    buyer_name: String,
    buyer_email: String,
    buyer_phone: Option<String>,
    shipping_address: String,
    subtotal_cents: i64,
    quantity_savings_cents: i64,
    coupon_id: Option<String>,
    coupon_code: Option<String>,
    coupon_discount_cents: i64,
    shipping_cents: i64,
    total_cents: i64,
    refund_amount_cents: Option<i64>,
    refund_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>, tracking: Vec<TrackingEvent>) -> Order {
        Order {
            id: self.id,
            order_number: self.order_number,
            status: self.status,
            payment_status: self.payment_status,
            tender: self.tender,
            tier: self.tier,
            gateway_ref: self.gateway_ref,
            gateway_payment_id: self.gateway_payment_id,
            buyer: BuyerInfo {
                name: self.buyer_name,
                email: self.buyer_email,
                phone: self.buyer_phone,
                shipping_address: self.shipping_address,
            },
            subtotal_cents: self.subtotal_cents,
            quantity_savings_cents: self.quantity_savings_cents,
            coupon_id: self.coupon_id,
            coupon_code: self.coupon_code,
            coupon_discount_cents: self.coupon_discount_cents,
            shipping_cents: self.shipping_cents,
            total_cents: self.total_cents,
            refund_amount_cents: self.refund_amount_cents,
            refund_id: self.refund_id,
            items,
            tracking,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// `ORD-20261016-4F3A9C1B`: date plus the head of a fresh UUID.
pub fn order_number(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix.to_uppercase())
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        self.fetch_where("id", id).await
    }

    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        self.fetch_where("order_number", order_number).await
    }

    pub async fn get_by_gateway_ref(&self, gateway_ref: &str) -> DbResult<Option<Order>> {
        self.fetch_where("gateway_ref", gateway_ref).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, variant_id, name_snapshot, quantity,
                   base_unit_price_cents, unit_price_cents, line_total_cents,
                   savings_cents, applied_rule_id
            FROM order_items
            WHERE order_id = ?1
            ORDER BY position
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn tracking(&self, order_id: &str) -> DbResult<Vec<TrackingEvent>> {
        let events = sqlx::query_as::<_, TrackingEvent>(
            r#"
            SELECT id, order_id, status, note, created_at
            FROM order_tracking
            WHERE order_id = ?1
            ORDER BY julianday(created_at), rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// `column` is one of the fixed unique columns above, never caller input.
    async fn fetch_where(&self, column: &'static str, value: &str) -> DbResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = ?1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.items(&row.id).await?;
                let tracking = self.tracking(&row.id).await?;
                Ok(Some(row.into_order(items, tracking)))
            }
            None => Ok(None),
        }
    }

    async fn require(&self, id: &str) -> DbResult<Order> {
        self.get(id).await?.ok_or_else(|| DbError::not_found("Order", id))
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Atomically claims the intent (if any), takes stock, redeems the
    /// coupon and inserts the order. See the module docs for the steps.
    pub async fn commit(&self, new: &NewOrder, now: DateTime<Utc>) -> DbResult<CommitOutcome> {
        let order_id = Uuid::new_v4().to_string();
        let number = order_number(now);
        let quote = &new.quote;

        let mut tx = self.pool.begin().await?;

        if let Some(gateway_ref) = &new.gateway_ref {
            let claimed = sqlx::query(
                r#"
                UPDATE payment_intents SET
                    status = 'committed',
                    order_id = ?2,
                    updated_at = ?3
                WHERE gateway_ref = ?1 AND status = 'verified'
                "#,
            )
            .bind(gateway_ref)
            .bind(&order_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if claimed.rows_affected() == 0 {
                tx.rollback().await?;
                return self.resolve_lost_claim(gateway_ref).await;
            }
        }

        for (variant_id, quantity) in quote.variant_demand() {
            let taken = sqlx::query(
                r#"
                UPDATE product_variants SET
                    stock = stock - ?1,
                    updated_at = ?3
                WHERE id = ?2 AND stock >= ?1
                "#,
            )
            .bind(quantity)
            .bind(&variant_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if taken.rows_affected() == 0 {
                let available = sqlx::query_scalar::<_, i64>("SELECT stock FROM product_variants WHERE id = ?1")
                    .bind(&variant_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .unwrap_or(0);
                tx.rollback().await?;

                warn!(variant_id = %variant_id, available, requested = quantity, "Stock guard rejected commit");
                return Err(DbError::InsufficientStock {
                    variant_id,
                    available,
                    requested: quantity,
                });
            }
        }

        if let Some(coupon_id) = &quote.coupon_id {
            let redeemed = sqlx::query(
                r#"
                UPDATE coupons SET used_count = used_count + 1
                WHERE id = ?1
                  AND (usage_limit IS NULL OR used_count < usage_limit)
                "#,
            )
            .bind(coupon_id)
            .execute(&mut *tx)
            .await?;

            if redeemed.rows_affected() == 0 {
                tx.rollback().await?;
                warn!(coupon_id = %coupon_id, "Coupon guard rejected commit");
                return Err(DbError::CouponExhausted {
                    coupon_id: coupon_id.clone(),
                });
            }
        }

        if let Err(e) = insert_order(&mut tx, &order_id, &number, new, now).await {
            tx.rollback().await?;
            return match (&new.gateway_ref, e) {
                (Some(gateway_ref), e) if e.is_unique_violation_on("orders.gateway_ref") => {
                    self.resolve_lost_claim(gateway_ref).await
                }
                (_, e) => Err(e),
            };
        }

        tx.commit().await?;

        info!(
            order_id = %order_id,
            order_number = %number,
            total = quote.grand_total.cents(),
            gateway_ref = ?new.gateway_ref,
            "Order committed"
        );

        Ok(CommitOutcome::Created(self.require(&order_id).await?))
    }

    /// The claim matched nothing: either another commit won, or the intent
    /// is not in `VERIFIED`.
    async fn resolve_lost_claim(&self, gateway_ref: &str) -> DbResult<CommitOutcome> {
        if let Some(order) = self.get_by_gateway_ref(gateway_ref).await? {
            debug!(gateway_ref = %gateway_ref, order_id = %order.id, "Commit replayed");
            return Ok(CommitOutcome::AlreadyCommitted(order));
        }

        let status = sqlx::query_scalar::<_, String>("SELECT status FROM payment_intents WHERE gateway_ref = ?1")
            .bind(gateway_ref)
            .fetch_optional(&self.pool)
            .await?;

        match status {
            Some(status) => Err(DbError::IntentNotClaimable {
                gateway_ref: gateway_ref.to_string(),
                status,
            }),
            None => Err(DbError::not_found("Payment intent", gateway_ref)),
        }
    }

    // =========================================================================
    // Refund
    // =========================================================================

    /// Marks a paid order refunded, restores stock and appends tracking.
    ///
    /// The caller has already obtained `refund` from the gateway.
    pub async fn refund(&self, order_id: &str, refund: &RefundInfo, now: DateTime<Utc>) -> DbResult<Order> {
        let refundable = serde_json::to_string(OrderStatus::refundable_from())?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'refunded',
                payment_status = 'refunded',
                refund_amount_cents = ?2,
                refund_id = ?3,
                updated_at = ?4
            WHERE id = ?1
              AND payment_status = 'paid'
              AND status IN (SELECT value FROM json_each(?5))
            "#,
        )
        .bind(order_id)
        .bind(refund.amount_cents)
        .bind(&refund.refund_id)
        .bind(now)
        .bind(refundable)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.explain_conflict(order_id).await);
        }

        restore_stock(&mut tx, order_id, now).await?;
        append_tracking(&mut tx, order_id, OrderStatus::Refunded, &refund.reason, now).await?;

        tx.commit().await?;

        info!(order_id = %order_id, amount = refund.amount_cents, refund_id = %refund.refund_id, "Order refunded");
        self.require(order_id).await
    }

    // =========================================================================
    // Status Transition
    // =========================================================================

    /// Compare-and-set `from → to` with a tracking event.
    ///
    /// Cancelling additionally requires the payment not to be `PAID` and
    /// puts variant stock back.
    pub async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        note: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Order> {
        let cancelling = to == OrderStatus::Cancelled;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders SET
                status = ?3,
                updated_at = ?4
            WHERE id = ?1
              AND status = ?2
              AND (?5 = 0 OR payment_status <> 'paid')
            "#,
        )
        .bind(order_id)
        .bind(from)
        .bind(to)
        .bind(now)
        .bind(cancelling)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.explain_conflict(order_id).await);
        }

        if cancelling {
            restore_stock(&mut tx, order_id, now).await?;
        }
        append_tracking(&mut tx, order_id, to, note, now).await?;

        tx.commit().await?;

        debug!(order_id = %order_id, from = %from, to = %to, "Order status changed");
        self.require(order_id).await
    }

    async fn explain_conflict(&self, order_id: &str) -> DbError {
        match self.get(order_id).await {
            Ok(Some(order)) => DbError::status_conflict(
                "Order",
                order_id,
                format!("{} (payment {})", order.status, order.payment_status),
            ),
            Ok(None) => DbError::not_found("Order", order_id),
            Err(e) => e,
        }
    }
}

// =============================================================================
// Transaction Steps
// =============================================================================

async fn insert_order(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &str,
    order_number: &str,
    new: &NewOrder,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let quote = &new.quote;

    sqlx::query(&format!(
        "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)"
    ))
    .bind(order_id)
    .bind(order_number)
    .bind(new.status)
    .bind(new.payment_status)
    .bind(new.tender)
    .bind(quote.tier)
    .bind(&new.gateway_ref)
    .bind(&new.gateway_payment_id)
    .bind(&new.buyer.name)
    .bind(&new.buyer.email)
    .bind(&new.buyer.phone)
    .bind(&new.buyer.shipping_address)
    .bind(quote.subtotal.cents())
    .bind(quote.quantity_savings.cents())
    .bind(&quote.coupon_id)
    .bind(&quote.coupon_code)
    .bind(quote.coupon_discount.cents())
    .bind(quote.shipping.cents())
    .bind(quote.grand_total.cents())
    .bind(Option::<i64>::None)
    .bind(Option::<String>::None)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    for (position, line) in quote.lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, variant_id, name_snapshot, quantity,
                base_unit_price_cents, unit_price_cents, line_total_cents,
                savings_cents, applied_rule_id, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(order_id)
        .bind(&line.product_id)
        .bind(&line.variant_id)
        .bind(&line.product_name)
        .bind(line.quantity)
        .bind(line.base_unit_price.cents())
        .bind(line.unit_price.cents())
        .bind(line.line_total.cents())
        .bind(line.savings.cents())
        .bind(&line.applied_rule_id)
        .bind(i64::try_from(position).unwrap_or(i64::MAX))
        .execute(&mut **tx)
        .await?;
    }

    append_tracking(tx, order_id, new.status, &new.note, now).await
}

/// Puts every variant line's quantity back on the shelf.
async fn restore_stock(tx: &mut Transaction<'_, Sqlite>, order_id: &str, now: DateTime<Utc>) -> DbResult<()> {
    let restored = sqlx::query(
        r#"
        UPDATE product_variants SET
            stock = stock + (
                SELECT SUM(quantity) FROM order_items
                WHERE order_items.order_id = ?1
                  AND order_items.variant_id = product_variants.id
            ),
            updated_at = ?2
        WHERE id IN (
            SELECT variant_id FROM order_items
            WHERE order_id = ?1 AND variant_id IS NOT NULL
        )
        "#,
    )
    .bind(order_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    debug!(order_id = %order_id, variants = restored.rows_affected(), "Stock restored");
    Ok(())
}

async fn append_tracking(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &str,
    status: OrderStatus,
    note: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO order_tracking (id, order_id, status, note, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(order_id)
    .bind(status)
    .bind(note)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
