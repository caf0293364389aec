//! # settle-core: Pure Pricing & Settlement Logic
//!
//! This crate is the **heart** of Settle. It contains all pricing and
//! status rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Settle Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 settle-checkout (orchestration)                 │   │
//! │  │  quote ──► initiate ──► verify_and_commit ──► refund / status   │   │
//! │  └──────────┬───────────────────────┬───────────────────┬──────────┘   │
//! │             │                       │                   │              │
//! │  ┌──────────▼───────────────────────▼──────┐   ┌────────▼─────────┐   │
//! │  │        ★ settle-core (THIS CRATE) ★     │   │  settle-gateway  │   │
//! │  │                                         │   │  HTTP, HMAC      │   │
//! │  │  ┌────────┐ ┌─────────┐ ┌────────┐      │   └──────────────────┘   │
//! │  │  │ money  │ │ pricing │ │ coupon │      │                          │
//! │  │  └────────┘ └─────────┘ └────────┘      │   ┌──────────────────┐   │
//! │  │  ┌────────┐ ┌─────────┐ ┌──────────┐    │   │    settle-db     │   │
//! │  │  │ quote  │ │ status  │ │validation│    │◄──│ SQLite, commits  │   │
//! │  │  └────────┘ └─────────┘ └──────────┘    │   └──────────────────┘   │
//! │  │  NO I/O • NO DATABASE • NO NETWORK      │                          │
//! │  └─────────────────────────────────────────┘                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money (integer cents) and Rate (basis points)
//! - [`types`] - Domain types (Product, Coupon, PaymentIntent, Order, ...)
//! - [`pricing`] - PricingResolver for quantity-tier rules
//! - [`coupon`] - Coupon eligibility and discount
//! - [`quote`] - Quote assembly
//! - [`status`] - Intent and order transition tables
//! - [`validation`] - Request shape checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use settle_core::quote::{assemble_quote, CatalogSnapshot, QuotePolicy};
//! use settle_core::types::{LineRequest, QuoteRequest, TenderTier};
//!
//! let request = QuoteRequest {
//!     lines: vec![LineRequest { product_id: "p-1".into(), variant_id: None, quantity: 2 }],
//!     coupon_code: None,
//!     tier: TenderTier::Retail,
//! };
//!
//! // Unknown product: assembly fails before pricing anything.
//! let result = assemble_quote(&request, &CatalogSnapshot::default(), &QuotePolicy::default(), Utc::now());
//! assert!(result.is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod coupon;
pub mod error;
pub mod money;
pub mod pricing;
pub mod quote;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, CouponRejection, ValidationError};
pub use money::{Money, Rate};
pub use quote::{Quote, QuoteLine};
pub use status::{IntentStatus, OrderStatus, PaymentStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single quote.
pub const MAX_QUOTE_LINES: usize = 100;

/// Maximum quantity on a single line.
///
/// Catches typos like 1000 instead of 10 before they reach a gateway.
pub const MAX_ITEM_QUANTITY: i64 = 999;
