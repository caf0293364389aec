//! # Error Types
//!
//! Domain-specific error types for settle-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  settle-core errors (this file)                                        │
//! │  ├── CoreError        - Quote and transition rule violations           │
//! │  ├── CouponRejection  - Why a coupon code did not apply                │
//! │  └── ValidationError  - Malformed input                                │
//! │                                                                         │
//! │  settle-db        └── DbError       - Storage + guarded-write failures │
//! │  settle-gateway   └── GatewayError  - Provider / signature failures    │
//! │  settle-checkout  └── CheckoutError - What callers see                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → CheckoutError           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised while building a quote or moving a
/// status.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The request had no lines.
    #[error("Order has no items")]
    NoItems,

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but is not ACTIVE.
    #[error("Product {product_id} is not available for sale")]
    ProductUnavailable { product_id: String },

    /// Variant missing, or it belongs to another product.
    #[error("Variant {variant_id} not found for product {product_id}")]
    VariantNotFound {
        variant_id: String,
        product_id: String,
    },

    /// Requested more than is on hand.
    ///
    /// ## When This Occurs
    /// ```text
    /// Quote time:  stock 3, lines ask for 5   ──► rejected before payment
    /// Commit time: stock sold out during the redirect window
    ///              ──► guarded decrement fails ──► InsufficientStock
    /// ```
    #[error("Insufficient stock for variant {variant_id}: available {available}, requested {requested}")]
    InsufficientStock {
        variant_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Coupon {code} cannot be applied: {reason}")]
    CouponInvalid { code: String, reason: CouponRejection },

    /// Usage limit reached.
    #[error("Coupon {code} has reached its usage limit")]
    CouponExhausted { code: String },

    /// Transition not present in the status table.
    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Reason a coupon code was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("unknown code")]
    NotFound,

    #[error("coupon is inactive")]
    Inactive,

    #[error("coupon is not valid yet")]
    NotYetValid,

    #[error("coupon has expired")]
    Expired,

    #[error("order subtotal {subtotal} is below the minimum {minimum}")]
    BelowMinimum { minimum: i64, subtotal: i64 },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., malformed email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
