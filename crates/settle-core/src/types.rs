//! # Domain Types
//!
//! Core domain types used throughout Settle.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  CATALOG (read-only here)           FINITE SHARED STATE                 │
//! │  ┌──────────────────┐               ┌──────────────────┐               │
//! │  │ Product          │ 1 ─────── n   │ ProductVariant   │               │
//! │  │ three price lists│               │ stock (≥ 0)      │ ◄─ decremented│
//! │  │ subcategory_id ──┼──┐            └──────────────────┘    at commit  │
//! │  └──────────────────┘  │            ┌──────────────────┐               │
//! │                        │            │ Coupon           │               │
//! │  ┌──────────────────┐  │            │ used_count ≤     │ ◄─ incremented│
//! │  │ QuantityPriceRule│◄─┘            │   usage_limit    │    at commit  │
//! │  └──────────────────┘               └──────────────────┘               │
//! │                                                                         │
//! │  CHECKOUT                                                               │
//! │  QuoteRequest ──► Quote ──► PaymentIntent ──► Order ──► TrackingEvent  │
//! │  (input)         (ephemeral) (ephemeral)     (durable)  (append-only)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Amount Fields
//! Persisted amounts are `*_cents: i64` with `Money` accessors, the same
//! shape they have in the database rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Money, Rate};
use crate::quote::Quote;
use crate::status::{IntentStatus, OrderStatus, PaymentStatus};

// =============================================================================
// Tender Tier & Tender
// =============================================================================

/// Buyer classification selecting which price list applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TenderTier {
    #[default]
    Retail,
    Wholesale,
}

/// How an order is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Tender {
    /// Buyer pays in-page; the client returns a signature synchronously.
    HostedCheckout,
    /// Buyer leaves the flow; confirmation arrives by callback or poll.
    Redirect,
    /// No gateway; payment is collected on delivery.
    CashOnDelivery,
}

impl Tender {
    /// True when an external payment gateway is involved.
    pub fn uses_gateway(&self) -> bool {
        !matches!(self, Tender::CashOnDelivery)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tender::HostedCheckout => "hosted_checkout",
            Tender::Redirect => "redirect",
            Tender::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl std::fmt::Display for Tender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
}

/// A product with its three price lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, frozen onto order lines at commit.
    pub name: String,

    pub status: ProductStatus,

    /// Normal (list) price in cents.
    pub price_cents: i64,

    /// Promotional price in cents, when a promotion is running.
    pub offer_price_cents: Option<i64>,

    /// Wholesale price in cents. Absent for retail-only products.
    pub wholesale_price_cents: Option<i64>,

    /// Pricing subcategory whose quantity rules apply to this product.
    pub subcategory_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Selects the unit price for a buyer tier.
    ///
    /// ## Selection Order
    /// ```text
    /// tier == Wholesale && wholesale price defined ──► wholesale price
    ///                   else offer price defined   ──► offer price
    ///                   else                       ──► normal price
    /// ```
    pub fn base_price(&self, tier: TenderTier) -> Money {
        let cents = match (tier, self.wholesale_price_cents, self.offer_price_cents) {
            (TenderTier::Wholesale, Some(wholesale), _) => wholesale,
            (_, _, Some(offer)) => offer,
            _ => self.price_cents,
        };
        Money::from_cents(cents)
    }
}

/// A sellable variant of a product. Owns the stock count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    /// Descriptive attributes, e.g. "Red / XL".
    pub label: String,
    pub sku: Option<String>,
    /// Units on hand. Never negative.
    pub stock: i64,
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    #[inline]
    pub fn has_stock_for(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }
}

/// Discount kind of a quantity rule, as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// `value` is basis points off the line.
    Percentage,
    /// `value` is the whole line total in cents.
    FixedTotal,
}

/// Threshold discount for a pricing subcategory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct QuantityPriceRule {
    pub id: String,
    pub subcategory_id: String,
    /// Minimum line quantity for the rule to apply (≥ 2 when written).
    pub threshold: i64,
    pub kind: RuleKind,
    /// Basis points for `Percentage`, cents for `FixedTotal`.
    pub value: i64,
    pub is_active: bool,
}

/// A rule's discount, decoded from `kind` + `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDiscount {
    Percentage(Rate),
    FixedTotal(Money),
}

impl QuantityPriceRule {
    /// Decodes the stored value.
    ///
    /// A negative percentage cannot be represented as a `Rate`; it decodes
    /// to an out-of-range rate so the resolver discards it.
    pub fn discount(&self) -> RuleDiscount {
        match self.kind {
            RuleKind::Percentage => {
                RuleDiscount::Percentage(Rate::from_bps(u32::try_from(self.value).unwrap_or(u32::MAX)))
            }
            RuleKind::FixedTotal => RuleDiscount::FixedTotal(Money::from_cents(self.value)),
        }
    }

    pub fn applies_to(&self, quantity: i64) -> bool {
        self.is_active && self.threshold <= quantity
    }
}

// =============================================================================
// Coupon
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    /// `value` is basis points off the subtotal.
    Percentage,
    /// `value` is cents off the subtotal.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Coupon {
    pub id: String,
    /// Upper-case redemption code.
    pub code: String,
    pub kind: CouponKind,
    pub value: i64,
    /// Cap for percentage coupons.
    pub max_discount_cents: Option<i64>,
    pub min_order_cents: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// `None` means unlimited.
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub is_active: bool,
}

impl Coupon {
    /// True when another redemption fits under the usage limit.
    pub fn has_redemptions_left(&self) -> bool {
        self.usage_limit.map_or(true, |limit| self.used_count < limit)
    }
}

// =============================================================================
// Buyer & Request
// =============================================================================

/// Who is buying and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub shipping_address: String,
}

/// One requested order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
}

/// Everything needed to (re)compute a quote.
///
/// Stored verbatim on the payment intent so the commit step can recompute
/// from the original inputs rather than trusting the stored totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub lines: Vec<LineRequest>,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub tier: TenderTier,
}

// =============================================================================
// Payment Intent
// =============================================================================

/// The bridge between quote-time pricing and the eventual commit,
/// keyed by the gateway transaction reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub gateway_ref: String,
    pub tender: Tender,
    pub status: IntentStatus,
    pub request: QuoteRequest,
    /// Quote as priced at initiation. Informational only at commit.
    pub quote: Quote,
    pub buyer: BuyerInfo,
    /// Gateway-side payment id, set on verification.
    pub gateway_payment_id: Option<String>,
    pub failure_reason: Option<String>,
    /// Set once when the intent commits.
    pub order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Amount the buyer was asked to pay.
    pub fn amount(&self) -> Money {
        self.quote.grand_total
    }
}

// =============================================================================
// Order
// =============================================================================

/// A durable order. Created once, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Human-readable unique number, e.g. `ORD-20261016-4F3A9C1B`.
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub tender: Tender,
    pub tier: TenderTier,
    /// Unique per order when a gateway was used.
    pub gateway_ref: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub buyer: BuyerInfo,
    pub subtotal_cents: i64,
    pub quantity_savings_cents: i64,
    pub coupon_id: Option<String>,
    pub coupon_code: Option<String>,
    pub coupon_discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub refund_amount_cents: Option<i64>,
    pub refund_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub tracking: Vec<TrackingEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Lines that hold stock (have a variant), with their quantities.
    pub fn stocked_lines(&self) -> impl Iterator<Item = (&str, i64)> {
        self.items
            .iter()
            .filter_map(|item| item.variant_id.as_deref().map(|v| (v, item.quantity)))
    }
}

/// A line as charged. Snapshot pattern: product data frozen at commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub name_snapshot: String,
    pub quantity: i64,
    /// Base unit price before quantity rules.
    pub base_unit_price_cents: i64,
    /// Effective unit price actually charged.
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub savings_cents: i64,
    pub applied_rule_id: Option<String>,
}

/// Append-only order history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TrackingEvent {
    pub id: String,
    pub order_id: String,
    pub status: OrderStatus,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// What the gateway confirmed for a refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundInfo {
    pub amount_cents: i64,
    pub refund_id: String,
    pub reason: String,
}

// =============================================================================
// Notification Outbox
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    StatusChanged,
    Refunded,
}

/// A notification waiting to be delivered after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct NotificationOutboxEntry {
    pub id: String,
    pub kind: NotificationKind,
    pub order_id: String,
    /// Kind-specific JSON (status change pair, refund info).
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
