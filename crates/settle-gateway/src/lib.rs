//! # settle-gateway: Payment Gateway Clients for Settle
//!
//! Everything that talks to an external payment provider lives here behind
//! one trait, [`PaymentGateway`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Settle Gateway Layer                              │
//! │                                                                         │
//! │  settle-checkout                                                        │
//! │    PaymentIntentInitiator ──► create_payment                            │
//! │    SettlementCommitter    ──► verify_payment                            │
//! │    RefundCoordinator      ──► refund                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Gateways (Tender ──► Arc<dyn PaymentGateway>)                  │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────────────────────┐    ┌─────────────────────────┐   │   │
//! │  │   │ HostedCheckoutGateway   │    │ RedirectGateway         │   │   │
//! │  │   │ basic auth + HMAC       │    │ base64 + X-VERIFY       │   │   │
//! │  │   └─────────────────────────┘    └─────────────────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Provider connection settings
//! - [`error`] - Gateway error types
//! - [`hosted`] - Hosted checkout client
//! - [`redirect`] - Redirect client with status polling
//! - [`signature`] - HMAC and checksum schemes
//! - [`types`] - Requests, sessions, verification payloads

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod hosted;
pub mod redirect;
pub mod signature;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{HostedCheckoutConfig, RedirectConfig};
pub use error::{GatewayError, GatewayResult};
pub use hosted::HostedCheckoutGateway;
pub use redirect::RedirectGateway;
pub use types::{
    GatewayRefund, PaymentOutcome, PaymentRequest, PaymentSession, RedirectCallback, RefundRequest,
    SessionHandle, VerificationPayload, VerifiedPayment,
};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use settle_core::Tender;

// =============================================================================
// Gateway Trait
// =============================================================================

/// One external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The tender this gateway settles.
    fn tender(&self) -> Tender;

    /// Creates a payment for `request.amount` and returns the handle the
    /// buyer's client needs.
    async fn create_payment(&self, request: &PaymentRequest) -> GatewayResult<PaymentSession>;

    /// Checks `payload` is authentic for `gateway_ref` and reports the
    /// provider's verdict.
    ///
    /// Returns [`GatewayError::SignatureInvalid`] for forged or mismatched
    /// proofs.
    async fn verify_payment(
        &self,
        gateway_ref: &str,
        payload: &VerificationPayload,
    ) -> GatewayResult<VerifiedPayment>;

    async fn refund(&self, request: &RefundRequest) -> GatewayResult<GatewayRefund>;
}

// =============================================================================
// Gateway Registry
// =============================================================================

/// The configured gateways, looked up by tender.
#[derive(Clone, Default)]
pub struct Gateways {
    by_tender: HashMap<Tender, Arc<dyn PaymentGateway>>,
}

impl Gateways {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds clients for every configured provider.
    pub fn from_config(
        hosted: Option<&HostedCheckoutConfig>,
        redirect: Option<&RedirectConfig>,
    ) -> GatewayResult<Self> {
        let mut gateways = Gateways::new();
        if let Some(config) = hosted {
            gateways = gateways.with(Arc::new(HostedCheckoutGateway::new(config.clone())?));
        }
        if let Some(config) = redirect {
            gateways = gateways.with(Arc::new(RedirectGateway::new(config.clone())?));
        }
        Ok(gateways)
    }

    /// Registers `gateway` under its tender, replacing any previous one.
    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.by_tender.insert(gateway.tender(), gateway);
        self
    }

    pub fn get(&self, tender: Tender) -> GatewayResult<Arc<dyn PaymentGateway>> {
        self.by_tender
            .get(&tender)
            .cloned()
            .ok_or(GatewayError::NotConfigured { tender })
    }

    pub fn is_configured(&self, tender: Tender) -> bool {
        self.by_tender.contains_key(&tender)
    }
}

impl std::fmt::Debug for Gateways {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.by_tender.keys()).finish()
    }
}

// =============================================================================
// HTTP Helpers
// =============================================================================

/// Decodes a JSON body, mapping non-2xx statuses to [`GatewayError`].
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> GatewayResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::from_status(status, body));
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}
