//! # Hosted Checkout Gateway
//!
//! Provider-hosted in-page checkout. The buyer never leaves the page; the
//! provider's client script returns a signed triple on success.
//!
//! ## Flow
//! ```text
//! ┌──────────┐   POST /v1/orders (basic auth)   ┌──────────────┐
//! │ initiate │ ───────────────────────────────► │   provider   │
//! │          │ ◄─────────── { id: order_… } ─── │              │
//! └──────────┘                                  └──────────────┘
//!       │ order_id + key_id + amount                   ▲
//!       ▼                                              │ pays in-page
//! ┌──────────┐   (order_ref, payment_ref, signature)   │
//! │  buyer   │ ────────────────────────────────────────┘
//! └──────────┘
//!       │
//!       ▼
//! verify: order_ref == gateway_ref
//!         signature == hex(HMAC-SHA256(order_ref|payment_ref, key_secret))
//! ```
//!
//! The amount is bound to the remote order at creation, so verification does
//! not restate it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use settle_core::{Money, Tender};
use tracing::{debug, info, warn};

use crate::config::HostedCheckoutConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::signature::verify_hosted_signature;
use crate::types::{
    GatewayRefund, PaymentOutcome, PaymentRequest, PaymentSession, RefundRequest, SessionHandle,
    VerificationPayload, VerifiedPayment,
};
use crate::{read_json, PaymentGateway};

const ORDERS_PATH: &str = "/v1/orders";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: OrderNotes<'a>,
}

#[derive(Debug, Serialize)]
struct OrderNotes<'a> {
    buyer_email: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemoteOrder {
    id: String,
    amount: i64,
}

#[derive(Debug, Serialize)]
struct RefundBody<'a> {
    amount: i64,
    receipt: &'a str,
    notes: RefundNotes<'a>,
}

#[derive(Debug, Serialize)]
struct RefundNotes<'a> {
    reason: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemoteRefund {
    id: String,
    amount: i64,
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone)]
pub struct HostedCheckoutGateway {
    client: Client,
    config: HostedCheckoutConfig,
}

impl HostedCheckoutGateway {
    pub fn new(config: HostedCheckoutConfig) -> GatewayResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(HostedCheckoutGateway { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// The signed order must be the intent's order, and the HMAC must match.
    fn check_signature(
        &self,
        gateway_ref: &str,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> GatewayResult<()> {
        if order_ref != gateway_ref {
            warn!(gateway_ref = %gateway_ref, order_ref = %order_ref, "Signed order reference does not match intent");
            return Err(GatewayError::SignatureInvalid);
        }
        if !verify_hosted_signature(order_ref, payment_ref, signature, &self.config.key_secret)? {
            return Err(GatewayError::SignatureInvalid);
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for HostedCheckoutGateway {
    fn tender(&self) -> Tender {
        Tender::HostedCheckout
    }

    async fn create_payment(&self, request: &PaymentRequest) -> GatewayResult<PaymentSession> {
        let body = CreateOrderBody {
            amount: request.amount.cents(),
            currency: &self.config.currency,
            receipt: &request.merchant_ref,
            notes: OrderNotes {
                buyer_email: &request.buyer.email,
            },
        };

        debug!(receipt = %request.merchant_ref, amount = request.amount.cents(), "Creating hosted checkout order");

        let response = self
            .client
            .post(self.url(ORDERS_PATH))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await?;
        let order: RemoteOrder = read_json(response).await?;

        if order.amount != request.amount.cents() {
            return Err(GatewayError::InvalidResponse(format!(
                "remote order {} has amount {}, requested {}",
                order.id,
                order.amount,
                request.amount.cents()
            )));
        }

        info!(gateway_ref = %order.id, amount = order.amount, "Hosted checkout order created");

        Ok(PaymentSession {
            gateway_ref: order.id.clone(),
            handle: SessionHandle::HostedCheckout {
                order_id: order.id,
                key_id: self.config.key_id.clone(),
                amount: Money::from_cents(order.amount),
            },
        })
    }

    async fn verify_payment(
        &self,
        gateway_ref: &str,
        payload: &VerificationPayload,
    ) -> GatewayResult<VerifiedPayment> {
        let VerificationPayload::HostedCheckout {
            order_ref,
            payment_ref,
            signature,
        } = payload
        else {
            return Err(GatewayError::PayloadMismatch { tender: self.tender() });
        };

        self.check_signature(gateway_ref, order_ref, payment_ref, signature)?;

        Ok(VerifiedPayment {
            outcome: PaymentOutcome::Paid,
            gateway_payment_id: Some(payment_ref.clone()),
            amount: None,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> GatewayResult<GatewayRefund> {
        let path = format!("/v1/payments/{}/refund", request.gateway_payment_id);
        let body = RefundBody {
            amount: request.amount.cents(),
            receipt: &request.idempotency_key,
            notes: RefundNotes {
                reason: &request.reason,
            },
        };

        let response = self
            .client
            .post(self.url(&path))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await?;
        let refund: RemoteRefund = read_json(response).await?;

        info!(
            payment_id = %request.gateway_payment_id,
            refund_id = %refund.id,
            amount = refund.amount,
            "Hosted checkout refund issued"
        );

        Ok(GatewayRefund {
            refund_id: refund.id,
            amount: Money::from_cents(refund.amount),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::hosted_signature;

    fn gateway() -> HostedCheckoutGateway {
        HostedCheckoutGateway::new(HostedCheckoutConfig {
            base_url: "https://api.example.com/".into(),
            key_id: "key_test".into(),
            key_secret: "secret".into(),
            currency: "INR".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn payload(order_ref: &str, signature: String) -> VerificationPayload {
        VerificationPayload::HostedCheckout {
            order_ref: order_ref.into(),
            payment_ref: "pay_1".into(),
            signature,
        }
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        assert_eq!(gateway().url(ORDERS_PATH), "https://api.example.com/v1/orders");
    }

    #[tokio::test]
    async fn test_verify_accepts_valid_signature() {
        let signature = hosted_signature("order_1", "pay_1", "secret").unwrap();
        let verified = gateway()
            .verify_payment("order_1", &payload("order_1", signature))
            .await
            .unwrap();

        assert_eq!(verified.outcome, PaymentOutcome::Paid);
        assert_eq!(verified.gateway_payment_id.as_deref(), Some("pay_1"));
        assert_eq!(verified.amount, None);
    }

    #[tokio::test]
    async fn test_verify_rejects_signature_for_other_order() {
        // Valid signature, but for a different remote order than the intent.
        let signature = hosted_signature("order_2", "pay_1", "secret").unwrap();
        let err = gateway()
            .verify_payment("order_1", &payload("order_2", signature))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SignatureInvalid));
    }

    #[tokio::test]
    async fn test_verify_rejects_forged_signature() {
        let forged = hosted_signature("order_1", "pay_1", "guessed").unwrap();
        let err = gateway()
            .verify_payment("order_1", &payload("order_1", forged))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SignatureInvalid));
    }

    #[tokio::test]
    async fn test_verify_rejects_redirect_payload() {
        let err = gateway()
            .verify_payment("order_1", &VerificationPayload::Redirect { callback: None })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::PayloadMismatch { .. }));
    }
}
