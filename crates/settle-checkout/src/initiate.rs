//! # Payment Intent Initiator
//!
//! Quotes a cart, asks the tender's gateway for a payment handle and
//! records a `PENDING` intent keyed by the gateway reference.
//!
//! ```text
//! InitiateRequest
//!   │ validate buyer, refuse cash on delivery
//!   ▼
//! OrderQuoteBuilder::build ──► total must be > 0
//!   │
//!   ▼
//! gateway.create_payment(merchant_ref, total)
//!   │
//!   ▼
//! intents.insert(PENDING, expires_at = now + ttl)
//!   │
//!   ▼
//! InitiatedPayment { gateway_ref, handle, quote, expires_at }
//! ```
//!
//! Nothing is reserved: stock and coupons are only taken at commit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use settle_core::validation::validate_buyer;
use settle_core::{BuyerInfo, IntentStatus, PaymentIntent, Quote, QuoteRequest, Tender};
use settle_db::Database;
use settle_gateway::{Gateways, PaymentRequest, SessionHandle};
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{CheckoutError, CheckoutResult};
use crate::quote::OrderQuoteBuilder;

#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub buyer: BuyerInfo,
    pub request: QuoteRequest,
    pub tender: Tender,
}

/// What the buyer's client needs to complete payment.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub gateway_ref: String,
    pub handle: SessionHandle,
    pub quote: Quote,
    pub expires_at: DateTime<Utc>,
}

pub struct PaymentIntentInitiator {
    db: Database,
    gateways: Gateways,
    quotes: OrderQuoteBuilder,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PaymentIntentInitiator {
    pub fn new(
        db: Database,
        gateways: Gateways,
        quotes: OrderQuoteBuilder,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        PaymentIntentInitiator {
            db,
            gateways,
            quotes,
            clock,
            ttl,
        }
    }

    pub async fn initiate(&self, req: InitiateRequest) -> CheckoutResult<InitiatedPayment> {
        validate_buyer(&req.buyer)?;

        if !req.tender.uses_gateway() {
            return Err(CheckoutError::validation(
                "cash on delivery orders are committed directly, not through a payment intent",
            ));
        }
        let gateway = self.gateways.get(req.tender)?;

        let now = self.clock.now();
        let quote = self.quotes.build(&req.request, now).await?;

        if !quote.grand_total.is_positive() {
            return Err(CheckoutError::validation(format!(
                "order total must be positive, got {}",
                quote.grand_total
            )));
        }

        let merchant_ref = format!("TX{}", Uuid::new_v4().simple()).to_uppercase();
        let session = gateway
            .create_payment(&PaymentRequest {
                merchant_ref,
                amount: quote.grand_total,
                buyer: req.buyer.clone(),
            })
            .await?;

        let expires_at = now + self.ttl;
        let intent = PaymentIntent {
            gateway_ref: session.gateway_ref.clone(),
            tender: req.tender,
            status: IntentStatus::Pending,
            request: req.request,
            quote: quote.clone(),
            buyer: req.buyer,
            gateway_payment_id: None,
            failure_reason: None,
            order_id: None,
            created_at: now,
            expires_at,
            updated_at: now,
        };
        self.db.intents().insert(&intent).await?;

        info!(
            gateway_ref = %intent.gateway_ref,
            tender = %intent.tender,
            amount = quote.grand_total.cents(),
            "Payment initiated"
        );

        Ok(InitiatedPayment {
            gateway_ref: session.gateway_ref,
            handle: session.handle,
            quote,
            expires_at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{buyer, line, request, Harness};
    use settle_core::{CouponKind, Money};

    fn hosted(lines: QuoteRequest) -> InitiateRequest {
        InitiateRequest {
            buyer: buyer(),
            request: lines,
            tender: Tender::HostedCheckout,
        }
    }

    #[tokio::test]
    async fn test_initiate_records_pending_intent() {
        let h = Harness::new().await;
        h.seed_single(5).await;

        let initiated = h
            .initiator()
            .initiate(hosted(request(vec![line("p-1", Some("v-1"), 2)])))
            .await
            .unwrap();

        assert_eq!(initiated.quote.grand_total, Money::from_cents(2_000));
        assert_eq!(initiated.expires_at, h.now() + Duration::hours(24));
        assert!(matches!(
            initiated.handle,
            SessionHandle::HostedCheckout { amount, .. } if amount == Money::from_cents(2_000)
        ));

        let intent = h.db.intents().get(&initiated.gateway_ref).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Pending);
        assert_eq!(intent.amount(), Money::from_cents(2_000));
        assert_eq!(intent.request.lines[0].quantity, 2);

        // Nothing reserved yet.
        assert_eq!(h.stock("v-1").await, 5);
    }

    #[tokio::test]
    async fn test_redirect_adopts_merchant_ref() {
        let h = Harness::new().await;
        h.seed_single(5).await;

        let mut req = hosted(request(vec![line("p-1", Some("v-1"), 1)]));
        req.tender = Tender::Redirect;
        let initiated = h.initiator().initiate(req).await.unwrap();

        assert!(initiated.gateway_ref.starts_with("TX"));
        assert!(matches!(initiated.handle, SessionHandle::Redirect { .. }));
        assert_eq!(h.redirect.created(), 1);
        assert_eq!(h.hosted.created(), 0);
    }

    #[tokio::test]
    async fn test_cash_on_delivery_is_refused() {
        let h = Harness::new().await;
        h.seed_single(5).await;

        let mut req = hosted(request(vec![line("p-1", Some("v-1"), 1)]));
        req.tender = Tender::CashOnDelivery;
        let err = h.initiator().initiate(req).await.unwrap_err();

        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_zero_total_is_refused_before_gateway() {
        let h = Harness::new().await;
        h.seed_single(5).await;
        h.add_coupon("c-all", "ALL", CouponKind::Fixed, 5_000, 0, None).await;

        let mut lines = request(vec![line("p-1", Some("v-1"), 1)]);
        lines.coupon_code = Some("ALL".into());
        let err = h.initiator().initiate(hosted(lines)).await.unwrap_err();

        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(h.hosted.created(), 0);
    }

    #[tokio::test]
    async fn test_invalid_buyer_and_stock_errors() {
        let h = Harness::new().await;
        h.seed_single(1).await;

        let mut req = hosted(request(vec![line("p-1", Some("v-1"), 1)]));
        req.buyer.email = "not-an-email".into();
        assert_eq!(h.initiator().initiate(req).await.unwrap_err().code(), "VALIDATION_ERROR");

        let err = h
            .initiator()
            .initiate(hosted(request(vec![line("p-1", Some("v-1"), 2)])))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        assert_eq!(h.hosted.created(), 0);
    }
}
