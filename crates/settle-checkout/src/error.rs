//! # Checkout Error Type
//!
//! One error type for every checkout operation.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CoreError ────────┐                                                    │
//! │  (quote, status)   │                                                    │
//! │                    ├──► CheckoutError ──► code() / is_retryable()       │
//! │  DbError ──────────┤                                                    │
//! │  (guards, storage) │    Stock and coupon guard failures surface as      │
//! │                    │    the same Core variants a quote would raise.     │
//! │  GatewayError ─────┘                                                    │
//! │  (HTTP, signature)                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use settle_core::{CoreError, Money, ValidationError};
use settle_db::DbError;
use settle_gateway::GatewayError;
use thiserror::Error;

/// Result type alias for checkout operations.
pub type CheckoutResult<T> = Result<T, CheckoutError>;

#[derive(Debug, Error)]
pub enum CheckoutError {
    // =========================================================================
    // Input & Business Rules
    // =========================================================================
    #[error("Validation error: {0}")]
    Validation(String),

    /// Quote assembly or a guarded write refused the order.
    #[error(transparent)]
    Core(CoreError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // =========================================================================
    // Payment
    // =========================================================================
    /// Forged or mismatched payment proof. Security-relevant.
    #[error("Payment signature is invalid for {gateway_ref}")]
    SignatureInvalid { gateway_ref: String },

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// The provider has not settled the payment yet.
    #[error("Payment {gateway_ref} is still pending at the gateway")]
    PaymentPending { gateway_ref: String },

    #[error("Payment {gateway_ref} failed: {reason}")]
    PaymentFailed { gateway_ref: String, reason: String },

    #[error("Payment intent {gateway_ref} is {status}")]
    InvalidIntentState { gateway_ref: String, status: String },

    /// The recomputed total exceeds what was actually paid.
    #[error("Payment {gateway_ref}: paid {paid}, order now costs {required}")]
    PaymentAmountMismatch {
        gateway_ref: String,
        paid: Money,
        required: Money,
    },

    // =========================================================================
    // Orders & Refunds
    // =========================================================================
    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition { entity: String, from: String, to: String },

    /// Order changed underneath the caller; re-read and retry the decision.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Order {order_id} is already refunded")]
    AlreadyRefunded { order_id: String },

    #[error("Order {order_id} cannot be refunded: {reason}")]
    NotRefundable { order_id: String, reason: String },

    /// Gateway refused or failed the refund. Nothing was changed.
    #[error("Refund failed for order {order_id}: {reason}")]
    RefundFailed { order_id: String, reason: String },

    // =========================================================================
    // Infrastructure
    // =========================================================================
    #[error("Storage error: {0}")]
    Storage(DbError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CheckoutError {
    pub fn validation(message: impl Into<String>) -> Self {
        CheckoutError::Validation(message.into())
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CheckoutError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::GatewayUnavailable(_) | CheckoutError::PaymentPending { .. } => true,
            CheckoutError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Machine-readable code for callers that map errors to responses.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "VALIDATION_ERROR",
            CheckoutError::Core(CoreError::Validation(_)) => "VALIDATION_ERROR",
            CheckoutError::Core(CoreError::NoItems) => "NO_ITEMS",
            CheckoutError::Core(CoreError::ProductNotFound(_)) => "PRODUCT_NOT_FOUND",
            CheckoutError::Core(CoreError::VariantNotFound { .. }) => "PRODUCT_NOT_FOUND",
            CheckoutError::Core(CoreError::ProductUnavailable { .. }) => "PRODUCT_UNAVAILABLE",
            CheckoutError::Core(CoreError::InsufficientStock { .. }) => "INSUFFICIENT_STOCK",
            CheckoutError::Core(CoreError::CouponInvalid { .. }) => "COUPON_INVALID",
            CheckoutError::Core(CoreError::CouponExhausted { .. }) => "COUPON_EXHAUSTED",
            CheckoutError::Core(CoreError::InvalidTransition { .. }) => "INVALID_TRANSITION",
            CheckoutError::NotFound { .. } => "NOT_FOUND",
            CheckoutError::SignatureInvalid { .. } => "SIGNATURE_INVALID",
            CheckoutError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            CheckoutError::Gateway(_) => "GATEWAY_ERROR",
            CheckoutError::PaymentPending { .. } => "PAYMENT_PENDING",
            CheckoutError::PaymentFailed { .. } => "PAYMENT_FAILED",
            CheckoutError::InvalidIntentState { .. } => "INVALID_INTENT_STATE",
            CheckoutError::PaymentAmountMismatch { .. } => "PAYMENT_AMOUNT_MISMATCH",
            CheckoutError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CheckoutError::Conflict(_) => "CONFLICT",
            CheckoutError::AlreadyRefunded { .. } => "ALREADY_REFUNDED",
            CheckoutError::NotRefundable { .. } => "NOT_REFUNDABLE",
            CheckoutError::RefundFailed { .. } => "REFUND_FAILED",
            CheckoutError::Storage(_) => "STORAGE_ERROR",
            CheckoutError::Config(_) => "CONFIG_ERROR",
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { entity, from, to } => CheckoutError::InvalidTransition {
                entity: entity.to_string(),
                from,
                to,
            },
            other => CheckoutError::Core(other),
        }
    }
}

impl From<ValidationError> for CheckoutError {
    fn from(err: ValidationError) -> Self {
        CheckoutError::Core(CoreError::Validation(err))
    }
}

impl From<DbError> for CheckoutError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => CheckoutError::NotFound { entity, id },
            DbError::InsufficientStock {
                variant_id,
                available,
                requested,
            } => CheckoutError::Core(CoreError::InsufficientStock {
                variant_id,
                available,
                requested,
            }),
            DbError::CouponExhausted { coupon_id } => {
                CheckoutError::Core(CoreError::CouponExhausted { code: coupon_id })
            }
            DbError::IntentNotClaimable { gateway_ref, status } => {
                CheckoutError::InvalidIntentState { gateway_ref, status }
            }
            DbError::StatusConflict { entity, id, current } => {
                CheckoutError::Conflict(format!("{entity} {id} is {current}"))
            }
            other => CheckoutError::Storage(other),
        }
    }
}

/// Gateway errors without the transaction context. Call sites that know the
/// reference map [`GatewayError::SignatureInvalid`] themselves.
impl From<GatewayError> for CheckoutError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured { tender } => {
                CheckoutError::GatewayUnavailable(format!("no gateway configured for {tender}"))
            }
            GatewayError::SignatureInvalid => CheckoutError::SignatureInvalid {
                gateway_ref: String::new(),
            },
            e if e.is_retryable() => CheckoutError::GatewayUnavailable(e.to_string()),
            e => CheckoutError::Gateway(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_failures_map_to_core_variants() {
        let err: CheckoutError = DbError::InsufficientStock {
            variant_id: "v-1".into(),
            available: 0,
            requested: 5,
        }
        .into();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");

        let err: CheckoutError = DbError::IntentNotClaimable {
            gateway_ref: "ref".into(),
            status: "expired".into(),
        }
        .into();
        assert!(matches!(err, CheckoutError::InvalidIntentState { .. }));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CheckoutError::from(GatewayError::Timeout).is_retryable());
        assert!(CheckoutError::from(DbError::PoolExhausted).is_retryable());
        assert!(!CheckoutError::from(GatewayError::SignatureInvalid).is_retryable());
        assert!(!CheckoutError::AlreadyRefunded { order_id: "o".into() }.is_retryable());
    }

    #[test]
    fn test_missing_gateway_is_unavailable() {
        let err = CheckoutError::from(GatewayError::NotConfigured {
            tender: settle_core::Tender::Redirect,
        });
        assert_eq!(err.code(), "GATEWAY_UNAVAILABLE");
    }

    #[test]
    fn test_core_transition_flattens() {
        let err = CheckoutError::from(CoreError::InvalidTransition {
            entity: "order",
            from: "delivered".into(),
            to: "pending".into(),
        });
        assert_eq!(err.to_string(), "Cannot move order from delivered to pending");
    }
}
