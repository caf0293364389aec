//! # Redirect Gateway
//!
//! The buyer is sent to the provider's pay page and returns later. Our
//! reference is the merchant transaction id; every call carries a salted
//! SHA-256 `X-VERIFY` header.
//!
//! ## Verification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Callback (optional)                                                 │
//! │     X-VERIFY == sha256(response + salt) ### idx   else SignatureInvalid │
//! │     decoded merchantTransactionId == gateway_ref  else SignatureInvalid │
//! │                                                                         │
//! │  2. Status poll (always, authoritative)                                 │
//! │     GET /pg/v1/status/{merchant}/{ref}                                  │
//! │     transient failure ──► exponential backoff ──► retry                 │
//! │                                                                         │
//! │  3. Interpret                                                           │
//! │     PAYMENT_SUCCESS ──► Paid { transactionId, amount }                  │
//! │     PAYMENT_PENDING ──► Pending                                         │
//! │     anything else   ──► Failed { code }                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A callback never decides the outcome on its own; it only has to be
//! authentic if present.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use settle_core::{Money, Tender};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RedirectConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::signature::{redirect_checksum, verify_redirect_checksum};
use crate::types::{
    GatewayRefund, PaymentOutcome, PaymentRequest, PaymentSession, RedirectCallback, RefundRequest,
    SessionHandle, VerificationPayload, VerifiedPayment,
};
use crate::{read_json, PaymentGateway};

const PAY_PATH: &str = "/pg/v1/pay";
const REFUND_PATH: &str = "/pg/v1/refund";

const CODE_SUCCESS: &str = "PAYMENT_SUCCESS";
const CODE_PENDING: &str = "PAYMENT_PENDING";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PayPayload<'a> {
    merchant_id: &'a str,
    merchant_transaction_id: &'a str,
    merchant_user_id: &'a str,
    amount: i64,
    redirect_url: &'a str,
    redirect_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mobile_number: Option<&'a str>,
    payment_instrument: PaymentInstrument,
}

#[derive(Debug, Serialize)]
struct PaymentInstrument {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundPayload<'a> {
    merchant_id: &'a str,
    merchant_user_id: &'a str,
    original_transaction_id: &'a str,
    merchant_transaction_id: &'a str,
    amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct EncodedRequest {
    request: String,
}

/// Envelope every provider response (and callback) shares.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    code: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayData {
    instrument_response: InstrumentResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentResponse {
    redirect_info: RedirectInfo,
}

#[derive(Debug, Deserialize)]
struct RedirectInfo {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionData {
    merchant_transaction_id: String,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone)]
pub struct RedirectGateway {
    client: Client,
    config: RedirectConfig,
}

impl RedirectGateway {
    pub fn new(config: RedirectConfig) -> GatewayResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(RedirectGateway { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn status_path(&self, gateway_ref: &str) -> String {
        format!("/pg/v1/status/{}/{}", self.config.merchant_id, gateway_ref)
    }

    /// Base64 body plus its `X-VERIFY` header for a POST to `path`.
    fn encode<T: Serialize>(&self, payload: &T, path: &str) -> GatewayResult<(EncodedRequest, String)> {
        let encoded = BASE64.encode(serde_json::to_vec(payload)?);
        let checksum = redirect_checksum(&encoded, path, &self.config.salt_key, self.config.salt_index);
        Ok((EncodedRequest { request: encoded }, checksum))
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &EncodedRequest,
        checksum: &str,
    ) -> GatewayResult<Envelope<T>> {
        let response = self
            .client
            .post(self.url(path))
            .header("X-VERIFY", checksum)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    /// Authenticates a callback and checks it is about `gateway_ref`.
    fn check_callback(&self, gateway_ref: &str, callback: &RedirectCallback) -> GatewayResult<()> {
        if !verify_redirect_checksum(
            &callback.x_verify,
            &callback.response,
            "",
            &self.config.salt_key,
            self.config.salt_index,
        ) {
            return Err(GatewayError::SignatureInvalid);
        }

        let decoded = BASE64
            .decode(callback.response.trim())
            .map_err(|_| GatewayError::SignatureInvalid)?;
        let envelope: Envelope<TransactionData> =
            serde_json::from_slice(&decoded).map_err(|_| GatewayError::SignatureInvalid)?;

        match envelope.data {
            Some(data) if data.merchant_transaction_id == gateway_ref => Ok(()),
            _ => {
                warn!(gateway_ref = %gateway_ref, "Authentic callback names a different transaction");
                Err(GatewayError::SignatureInvalid)
            }
        }
    }

    async fn fetch_status(&self, gateway_ref: &str) -> GatewayResult<Envelope<TransactionData>> {
        let path = self.status_path(gateway_ref);
        let checksum = redirect_checksum("", &path, &self.config.salt_key, self.config.salt_index);

        let response = self
            .client
            .get(self.url(&path))
            .header("X-VERIFY", checksum)
            .header("X-MERCHANT-ID", &self.config.merchant_id)
            .send()
            .await?;
        read_json(response).await
    }

    /// Polls the status endpoint, retrying transient failures.
    async fn poll_status(&self, gateway_ref: &str) -> GatewayResult<Envelope<TransactionData>> {
        let mut backoff = self.create_backoff();

        loop {
            match self.fetch_status(gateway_ref).await {
                Ok(envelope) => return Ok(envelope),
                Err(e) if e.is_retryable() => match backoff.next_backoff() {
                    Some(delay) => {
                        warn!(gateway_ref = %gateway_ref, error = %e, ?delay, "Status poll failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// The builder seeds `current_interval` too, so the first retry already
    /// honours `poll_initial_backoff_ms`.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.poll_initial_backoff_ms))
            .with_randomization_factor(0.5)
            .with_multiplier(2.0)
            .with_max_interval(Duration::from_secs(self.config.poll_max_backoff_secs))
            .with_max_elapsed_time(Some(Duration::from_secs(self.config.poll_max_elapsed_secs)))
            .build()
    }
}

/// Maps a status envelope to a verdict.
fn interpret_status(gateway_ref: &str, envelope: Envelope<TransactionData>) -> GatewayResult<VerifiedPayment> {
    match envelope.code.as_str() {
        CODE_SUCCESS if envelope.success => {
            let data = envelope
                .data
                .ok_or_else(|| GatewayError::InvalidResponse("success without transaction data".into()))?;
            if data.merchant_transaction_id != gateway_ref {
                return Err(GatewayError::InvalidResponse(format!(
                    "status for {} answered with {}",
                    gateway_ref, data.merchant_transaction_id
                )));
            }
            let amount = data
                .amount
                .ok_or_else(|| GatewayError::InvalidResponse("success without amount".into()))?;
            Ok(VerifiedPayment {
                outcome: PaymentOutcome::Paid,
                gateway_payment_id: data.transaction_id,
                amount: Some(Money::from_cents(amount)),
            })
        }
        CODE_PENDING => Ok(VerifiedPayment {
            outcome: PaymentOutcome::Pending,
            gateway_payment_id: None,
            amount: None,
        }),
        code => Ok(VerifiedPayment {
            outcome: PaymentOutcome::Failed {
                reason: envelope.message.unwrap_or_else(|| code.to_string()),
            },
            gateway_payment_id: envelope.data.and_then(|d| d.transaction_id),
            amount: None,
        }),
    }
}

#[async_trait]
impl PaymentGateway for RedirectGateway {
    fn tender(&self) -> Tender {
        Tender::Redirect
    }

    async fn create_payment(&self, request: &PaymentRequest) -> GatewayResult<PaymentSession> {
        let payload = PayPayload {
            merchant_id: &self.config.merchant_id,
            merchant_transaction_id: &request.merchant_ref,
            merchant_user_id: &request.buyer.email,
            amount: request.amount.cents(),
            redirect_url: &self.config.redirect_url,
            redirect_mode: "REDIRECT",
            callback_url: self.config.callback_url.as_deref(),
            mobile_number: request.buyer.phone.as_deref(),
            payment_instrument: PaymentInstrument { kind: "PAY_PAGE" },
        };
        let (body, checksum) = self.encode(&payload, PAY_PATH)?;

        debug!(gateway_ref = %request.merchant_ref, amount = request.amount.cents(), "Creating redirect payment");

        let envelope: Envelope<PayData> = self.post_signed(PAY_PATH, &body, &checksum).await?;
        if !envelope.success {
            return Err(GatewayError::Rejected {
                status: 200,
                message: envelope.message.unwrap_or(envelope.code),
            });
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("pay response without data".into()))?;

        info!(gateway_ref = %request.merchant_ref, "Redirect payment created");

        Ok(PaymentSession {
            gateway_ref: request.merchant_ref.clone(),
            handle: SessionHandle::Redirect {
                redirect_url: data.instrument_response.redirect_info.url,
            },
        })
    }

    async fn verify_payment(
        &self,
        gateway_ref: &str,
        payload: &VerificationPayload,
    ) -> GatewayResult<VerifiedPayment> {
        let VerificationPayload::Redirect { callback } = payload else {
            return Err(GatewayError::PayloadMismatch { tender: self.tender() });
        };

        if let Some(callback) = callback {
            self.check_callback(gateway_ref, callback)?;
            debug!(gateway_ref = %gateway_ref, "Callback authenticated");
        }

        let envelope = self.poll_status(gateway_ref).await?;
        interpret_status(gateway_ref, envelope)
    }

    async fn refund(&self, request: &RefundRequest) -> GatewayResult<GatewayRefund> {
        let payload = RefundPayload {
            merchant_id: &self.config.merchant_id,
            merchant_user_id: &self.config.merchant_id,
            original_transaction_id: &request.gateway_ref,
            merchant_transaction_id: &request.idempotency_key,
            amount: request.amount.cents(),
            callback_url: self.config.callback_url.as_deref(),
        };
        let (body, checksum) = self.encode(&payload, REFUND_PATH)?;

        let envelope: Envelope<TransactionData> = self.post_signed(REFUND_PATH, &body, &checksum).await?;
        if !envelope.success {
            return Err(GatewayError::Rejected {
                status: 200,
                message: envelope.message.unwrap_or(envelope.code),
            });
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("refund response without data".into()))?;

        let refund_id = data.transaction_id.unwrap_or(data.merchant_transaction_id);
        info!(gateway_ref = %request.gateway_ref, refund_id = %refund_id, "Redirect refund issued");

        Ok(GatewayRefund {
            refund_id,
            amount: Money::from_cents(data.amount.unwrap_or(request.amount.cents())),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
