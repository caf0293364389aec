//! # Gateway Error Types
//!
//! Error types for payment provider calls.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Gateway Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Provider            │ │
//! │  │                 │  │  (retryable)    │  │                         │ │
//! │  │  NotConfigured  │  │  Unavailable    │  │  Rejected               │ │
//! │  │  InvalidConfig  │  │  Timeout        │  │  InvalidResponse        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Security: SignatureInvalid. Never retried, always audited.     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use settle_core::Tender;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// No client is configured for this tender.
    #[error("No payment gateway configured for {tender}")]
    NotConfigured { tender: Tender },

    #[error("Invalid gateway configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Provider could not be reached, or answered 5xx / 429.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Payment gateway timed out")]
    Timeout,

    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// Provider refused the request (4xx).
    #[error("Payment gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Provider answered with something we cannot interpret.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    /// Verification payload does not belong to this gateway.
    #[error("Verification payload is not valid for {tender}")]
    PayloadMismatch { tender: Tender },

    // =========================================================================
    // Security
    // =========================================================================
    /// Signature or checksum did not match.
    #[error("Payment signature is invalid")]
    SignatureInvalid,

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// True for failures where repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Timeout)
    }

    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            GatewayError::Unavailable(format!("HTTP {}: {}", status.as_u16(), body))
        } else {
            GatewayError::Rejected {
                status: status.as_u16(),
                message: body,
            }
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::from_status(status, err.to_string())
        } else {
            GatewayError::Unavailable(err.to_string())
        }
    }
}
