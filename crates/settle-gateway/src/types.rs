//! Request and response types shared by every gateway.

use serde::{Deserialize, Serialize};
use settle_core::{BuyerInfo, Money, Tender};

// =============================================================================
// Create Payment
// =============================================================================

/// Ask a provider for a payment handle.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Our reference for this attempt. Redirect providers adopt it as the
    /// transaction reference; hosted checkout sends it as the receipt.
    pub merchant_ref: String,
    pub amount: Money,
    pub buyer: BuyerInfo,
}

/// What the buyer's client needs to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionHandle {
    /// Open the provider's in-page checkout for `order_id`.
    HostedCheckout {
        order_id: String,
        key_id: String,
        amount: Money,
    },
    /// Send the buyer to `redirect_url`.
    Redirect { redirect_url: String },
}

/// A created payment: the transaction reference the intent is keyed by,
/// plus the client handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub gateway_ref: String,
    pub handle: SessionHandle,
}

// =============================================================================
// Verification
// =============================================================================

/// Server-to-server callback body from a redirect provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectCallback {
    /// Base64 JSON as posted by the provider.
    pub response: String,
    /// The `X-VERIFY` header that came with it.
    pub x_verify: String,
}

/// Proof of payment handed back by the buyer's client or the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationPayload {
    HostedCheckout {
        order_ref: String,
        payment_ref: String,
        signature: String,
    },
    /// The callback is optional; the status poll always runs.
    Redirect { callback: Option<RedirectCallback> },
}

impl VerificationPayload {
    pub fn tender(&self) -> Tender {
        match self {
            VerificationPayload::HostedCheckout { .. } => Tender::HostedCheckout,
            VerificationPayload::Redirect { .. } => Tender::Redirect,
        }
    }
}

/// Provider's verdict on a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    /// Still in flight; ask again later.
    Pending,
    /// Definitively failed at the provider.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub outcome: PaymentOutcome,
    pub gateway_payment_id: Option<String>,
    /// Amount the provider reports as paid. `None` when the provider binds
    /// the amount to the signed remote order and does not restate it.
    pub amount: Option<Money>,
}

// =============================================================================
// Refund
// =============================================================================

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub gateway_ref: String,
    pub gateway_payment_id: String,
    pub amount: Money,
    /// Repeating a call with the same key must not refund twice.
    pub idempotency_key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRefund {
    pub refund_id: String,
    pub amount: Money,
}
