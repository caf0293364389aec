//! # Settlement Committer
//!
//! Turns a verified payment into exactly one order.
//!
//! ## Flow
//! ```text
//! verify_and_commit(gateway_ref, payload)
//!   │
//!   ├─ intent COMMITTED ───────────────────────────► Replayed(existing order)
//!   ├─ intent FAILED / EXPIRED ────────────────────► InvalidIntentState
//!   │
//!   ├─ gateway.verify_payment
//!   │    ├─ SignatureInvalid ──► warn, intent stays PENDING
//!   │    ├─ Pending ───────────► PaymentPending (retry later)
//!   │    └─ Failed ────────────► intent FAILED
//!   │
//!   ├─ reported amount ≠ snapshot total ───────────► intent FAILED
//!   ├─ intent → VERIFIED
//!   │
//!   ├─ recompute quote from the stored request
//!   │    ├─ catalog refuses (stock, coupon) ──► intent FAILED
//!   │    └─ total > paid ─────────────────────► intent FAILED
//!   │
//!   └─ orders.commit (one transaction)
//!        ├─ Created ──────────► enqueue order_created ──► Committed(order)
//!        ├─ AlreadyCommitted ─────────────────────────► Replayed(order)
//!        └─ stock / coupon guard ──► error log, intent FAILED
//! ```
//!
//! A lower recomputed total is accepted: the buyer paid more than the
//! order now costs, which is logged for reconciliation.
//!
//! Cash on delivery skips the gateway and the intent entirely and runs
//! the same commit transaction through [`SettlementCommitter::commit_cash_on_delivery`].

use std::sync::Arc;

use settle_core::validation::validate_buyer;
use chrono::{DateTime, Utc};
use settle_core::{
    BuyerInfo, CoreError, IntentStatus, Money, Order, OrderStatus, PaymentIntent, PaymentStatus, Quote,
    QuoteRequest, Tender,
};
use settle_db::{CommitOutcome, Database, DbError, NewOrder};
use settle_gateway::{GatewayError, Gateways, PaymentOutcome, VerificationPayload};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{CheckoutError, CheckoutResult};
use crate::notify::NotificationOutbox;
use crate::quote::OrderQuoteBuilder;

/// Result of a successful settlement call.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// This call created the order.
    Committed(Order),
    /// The payment was already settled; the existing order is returned.
    Replayed(Order),
}

impl Settlement {
    pub fn order(&self) -> &Order {
        match self {
            Settlement::Committed(order) | Settlement::Replayed(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Settlement::Committed(order) | Settlement::Replayed(order) => order,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Settlement::Replayed(_))
    }
}

pub struct SettlementCommitter {
    db: Database,
    gateways: Gateways,
    quotes: OrderQuoteBuilder,
    outbox: NotificationOutbox,
    clock: Arc<dyn Clock>,
}

impl SettlementCommitter {
    pub fn new(db: Database, gateways: Gateways, quotes: OrderQuoteBuilder, clock: Arc<dyn Clock>) -> Self {
        let outbox = NotificationOutbox::new(&db);
        SettlementCommitter {
            db,
            gateways,
            quotes,
            outbox,
            clock,
        }
    }

    // =========================================================================
    // Gateway Tenders
    // =========================================================================

    /// Verifies the payment proof for `gateway_ref` and commits its order.
    ///
    /// Safe to call any number of times, concurrently: at most one order
    /// is ever created per reference and every later call replays it.
    pub async fn verify_and_commit(
        &self,
        gateway_ref: &str,
        payload: &VerificationPayload,
    ) -> CheckoutResult<Settlement> {
        let intent = self
            .db
            .intents()
            .get(gateway_ref)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Payment intent", gateway_ref))?;

        match intent.status {
            IntentStatus::Committed => return self.replay(gateway_ref).await,
            IntentStatus::Failed | IntentStatus::Expired => {
                return Err(CheckoutError::InvalidIntentState {
                    gateway_ref: gateway_ref.to_string(),
                    status: intent.status.to_string(),
                })
            }
            IntentStatus::Pending | IntentStatus::Verified => {}
        }

        if payload.tender() != intent.tender {
            return Err(CheckoutError::validation(format!(
                "{} proof submitted for a {} payment",
                payload.tender(),
                intent.tender
            )));
        }

        let paid = self.verify_with_gateway(&intent, payload).await?;
        let now = self.clock.now();

        match self
            .db
            .intents()
            .mark_verified(gateway_ref, paid.payment_id.as_deref(), now)
            .await
        {
            Ok(()) => {}
            // A concurrent call got here first and committed.
            Err(DbError::IntentNotClaimable { .. }) => return self.replay(gateway_ref).await,
            Err(e) => return Err(e.into()),
        }

        let quote = match self.quotes.build(&intent.request, now).await {
            Ok(quote) => quote,
            Err(CheckoutError::Core(e)) => {
                // The stock this call saw missing may be the stock a
                // concurrent commit of the same payment just took.
                if let Some(order) = self.db.orders().get_by_gateway_ref(gateway_ref).await? {
                    return Ok(Settlement::Replayed(order));
                }
                error!(
                    gateway_ref = %gateway_ref,
                    error = %e,
                    "Paid order can no longer be fulfilled; needs manual reconciliation"
                );
                self.fail_intent(gateway_ref, &e.to_string()).await;
                return Err(CheckoutError::Core(e));
            }
            Err(e) => return Err(e),
        };

        if quote.grand_total > paid.amount {
            let reason = format!("order now costs {}, paid {}", quote.grand_total, paid.amount);
            warn!(gateway_ref = %gateway_ref, %reason, "Recomputed total exceeds payment");
            self.fail_intent(gateway_ref, &reason).await;
            return Err(CheckoutError::PaymentAmountMismatch {
                gateway_ref: gateway_ref.to_string(),
                paid: paid.amount,
                required: quote.grand_total,
            });
        }
        if quote.grand_total < paid.amount || !quote.same_totals(&intent.quote) {
            info!(
                gateway_ref = %gateway_ref,
                paid = paid.amount.cents(),
                total = quote.grand_total.cents(),
                "Quote drifted since initiation"
            );
        }

        self.commit_paid(&intent, paid, quote, now).await
    }

    /// Runs the commit transaction for a verified payment and a freshly
    /// recomputed quote.
    async fn commit_paid(
        &self,
        intent: &PaymentIntent,
        paid: ConfirmedPayment,
        quote: Quote,
        now: DateTime<Utc>,
    ) -> CheckoutResult<Settlement> {
        let gateway_ref = intent.gateway_ref.as_str();
        let new = NewOrder {
            quote,
            buyer: intent.buyer.clone(),
            tender: intent.tender,
            status: OrderStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            gateway_ref: Some(gateway_ref.to_string()),
            gateway_payment_id: paid.payment_id.or_else(|| intent.gateway_payment_id.clone()),
            note: "Payment verified".to_string(),
        };

        match self.db.orders().commit(&new, now).await {
            Ok(CommitOutcome::Created(order)) => {
                self.outbox.order_created(&order, now).await;
                Ok(Settlement::Committed(order))
            }
            Ok(CommitOutcome::AlreadyCommitted(order)) => Ok(Settlement::Replayed(order)),
            Err(e @ (DbError::InsufficientStock { .. } | DbError::CouponExhausted { .. })) => {
                error!(
                    gateway_ref = %gateway_ref,
                    error = %e,
                    "Commit rejected after payment; needs manual reconciliation"
                );
                self.fail_intent(gateway_ref, &e.to_string()).await;
                Err(match e {
                    DbError::CouponExhausted { .. } => CheckoutError::Core(CoreError::CouponExhausted {
                        code: new.quote.coupon_code.clone().unwrap_or_default(),
                    }),
                    other => other.into(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs gateway verification and the snapshot amount check.
    async fn verify_with_gateway(
        &self,
        intent: &PaymentIntent,
        payload: &VerificationPayload,
    ) -> CheckoutResult<ConfirmedPayment> {
        let gateway_ref = intent.gateway_ref.as_str();
        let gateway = self.gateways.get(intent.tender)?;

        let verified = match gateway.verify_payment(gateway_ref, payload).await {
            Ok(verified) => verified,
            Err(GatewayError::SignatureInvalid) => {
                warn!(gateway_ref = %gateway_ref, tender = %intent.tender, "Payment signature rejected");
                return Err(CheckoutError::SignatureInvalid {
                    gateway_ref: gateway_ref.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        match verified.outcome {
            PaymentOutcome::Paid => {}
            PaymentOutcome::Pending => {
                debug!(gateway_ref = %gateway_ref, "Payment still pending at gateway");
                return Err(CheckoutError::PaymentPending {
                    gateway_ref: gateway_ref.to_string(),
                });
            }
            PaymentOutcome::Failed { reason } => {
                self.fail_intent(gateway_ref, &reason).await;
                return Err(CheckoutError::PaymentFailed {
                    gateway_ref: gateway_ref.to_string(),
                    reason,
                });
            }
        }

        let expected = intent.amount();
        if let Some(reported) = verified.amount {
            if reported != expected {
                let reason = format!("gateway reports {reported}, intent expects {expected}");
                warn!(gateway_ref = %gateway_ref, %reason, "Paid amount mismatch");
                self.fail_intent(gateway_ref, &reason).await;
                return Err(CheckoutError::PaymentAmountMismatch {
                    gateway_ref: gateway_ref.to_string(),
                    paid: reported,
                    required: expected,
                });
            }
        }

        Ok(ConfirmedPayment {
            payment_id: verified.gateway_payment_id,
            amount: verified.amount.unwrap_or(expected),
        })
    }

    async fn replay(&self, gateway_ref: &str) -> CheckoutResult<Settlement> {
        match self.db.orders().get_by_gateway_ref(gateway_ref).await? {
            Some(order) => {
                debug!(gateway_ref = %gateway_ref, order_id = %order.id, "Settlement replayed");
                Ok(Settlement::Replayed(order))
            }
            None => match self.db.intents().get(gateway_ref).await? {
                Some(intent) => Err(CheckoutError::InvalidIntentState {
                    gateway_ref: gateway_ref.to_string(),
                    status: intent.status.to_string(),
                }),
                None => Err(CheckoutError::not_found("Payment intent", gateway_ref)),
            },
        }
    }

    async fn fail_intent(&self, gateway_ref: &str, reason: &str) {
        let now = self.clock.now();
        if let Err(e) = self.db.intents().mark_failed(gateway_ref, reason, now).await {
            warn!(gateway_ref = %gateway_ref, error = %e, "Could not mark payment intent failed");
        }
    }

    // =========================================================================
    // Cash on Delivery
    // =========================================================================

    /// Commits a cash-on-delivery order: `PENDING` order, `PENDING` payment.
    pub async fn commit_cash_on_delivery(&self, buyer: BuyerInfo, request: &QuoteRequest) -> CheckoutResult<Order> {
        validate_buyer(&buyer)?;

        let now = self.clock.now();
        let quote = self.quotes.build(request, now).await?;
        if !quote.grand_total.is_positive() {
            return Err(CheckoutError::validation(format!(
                "order total must be positive, got {}",
                quote.grand_total
            )));
        }

        let new = NewOrder {
            quote,
            buyer,
            tender: Tender::CashOnDelivery,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            gateway_ref: None,
            gateway_payment_id: None,
            note: "Order placed, payment on delivery".to_string(),
        };

        let order = self.db.orders().commit(&new, now).await?.into_order();
        self.outbox.order_created(&order, now).await;
        Ok(order)
    }
}

/// A payment the gateway confirmed as paid.
struct ConfirmedPayment {
    payment_id: Option<String>,
    /// Reported by the gateway, or the snapshot total when it binds the
    /// amount to the remote order instead.
    amount: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================
