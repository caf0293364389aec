//! # Quote Assembly
//!
//! Turns a [`QuoteRequest`] plus the catalog facts it references into a
//! priced, non-persisted [`Quote`].
//!
//! ## Assembly Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QuoteRequest                        CatalogSnapshot (fetched by caller)│
//! │  lines, coupon code, tier            products, variants, rules, coupon  │
//! │        │                                       │                        │
//! │        └──────────────────┬────────────────────┘                        │
//! │                           ▼                                             │
//! │  1. shape checks (validation)           ──► ValidationError / NoItems   │
//! │  2. per line: product, ACTIVE, variant  ──► ProductNotFound / ...       │
//! │  3. stock per variant (summed)          ──► InsufficientStock           │
//! │  4. base price by tier ──► PricingResolver (exact Decimal)              │
//! │  5. coupon on the exact subtotal        ──► CouponInvalid / Exhausted   │
//! │  6. grand = subtotal − coupon + shipping                                │
//! │  7. round totals (banker's); coupon = rounded subtotal + ship − grand   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Assembly is pure: the same request and snapshot always produce the same
//! quote. That is what lets the commit step recompute and compare.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::coupon::evaluate_coupon;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::PricingResolver;
use crate::types::{Coupon, Product, ProductVariant, QuantityPriceRule, QuoteRequest, TenderTier};
use crate::validation::{normalize_coupon_code, validate_quote_request};

// =============================================================================
// Quote Types
// =============================================================================

/// One priced line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub product_name: String,
    pub quantity: i64,
    /// Tier-selected price before quantity rules.
    pub base_unit_price: Money,
    /// Effective unit price after quantity rules.
    pub unit_price: Money,
    pub line_total: Money,
    pub original_line_total: Money,
    pub savings: Money,
    pub applied_rule_id: Option<String>,
}

/// A priced cart. Never persisted on its own; only as a snapshot inside a
/// payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub tier: TenderTier,
    pub subtotal: Money,
    pub quantity_savings: Money,
    pub coupon_id: Option<String>,
    pub coupon_code: Option<String>,
    pub coupon_discount: Money,
    pub shipping: Money,
    pub grand_total: Money,
}

impl Quote {
    /// Total quantity requested per variant.
    pub fn variant_demand(&self) -> BTreeMap<String, i64> {
        let mut demand = BTreeMap::new();
        for line in &self.lines {
            if let Some(variant_id) = &line.variant_id {
                *demand.entry(variant_id.clone()).or_insert(0) += line.quantity;
            }
        }
        demand
    }

    /// True when every exposed amount matches.
    pub fn same_totals(&self, other: &Quote) -> bool {
        self.subtotal == other.subtotal
            && self.quantity_savings == other.quantity_savings
            && self.coupon_discount == other.coupon_discount
            && self.shipping == other.shipping
            && self.grand_total == other.grand_total
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// The catalog facts a request references, fetched before assembly.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub products: HashMap<String, Product>,
    pub variants: HashMap<String, ProductVariant>,
    /// Rules for every subcategory the products belong to.
    pub rules: Vec<QuantityPriceRule>,
    /// Coupon matching the request's normalized code, if any.
    pub coupon: Option<Coupon>,
}

/// Pricing knobs that are configuration, not catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotePolicy {
    /// Flat shipping cost added to every quote.
    pub shipping: Money,
}

// =============================================================================
// Assembly
// =============================================================================

/// Builds a quote.
pub fn assemble_quote(
    request: &QuoteRequest,
    catalog: &CatalogSnapshot,
    policy: &QuotePolicy,
    now: DateTime<Utc>,
) -> CoreResult<Quote> {
    if request.lines.is_empty() {
        return Err(CoreError::NoItems);
    }
    validate_quote_request(request)?;

    check_stock(request, catalog)?;

    let resolver = PricingResolver::new(&catalog.rules);
    let mut lines = Vec::with_capacity(request.lines.len());
    let mut exact_subtotal = Decimal::ZERO;
    let mut original_subtotal = Money::zero();

    for line in &request.lines {
        let product = active_product(catalog, &line.product_id)?;

        let price = resolver.resolve(
            product.base_price(request.tier),
            product.subcategory_id.as_deref(),
            line.quantity,
        );

        exact_subtotal += price.line_total;
        original_subtotal += price.original_line_total;

        let line_total = Money::from_decimal_cents(price.line_total);
        lines.push(QuoteLine {
            product_id: product.id.clone(),
            variant_id: line.variant_id.clone(),
            product_name: product.name.clone(),
            quantity: line.quantity,
            base_unit_price: price.base_unit_price,
            unit_price: Money::from_decimal_cents(price.unit_effective_price()),
            line_total,
            original_line_total: price.original_line_total,
            savings: price.original_line_total - line_total,
            applied_rule_id: price.applied_rule_id,
        });
    }

    let applied = match request.coupon_code.as_deref().and_then(normalize_coupon_code) {
        Some(code) => {
            let coupon = catalog.coupon.as_ref().filter(|c| c.code == code);
            Some(evaluate_coupon(&code, coupon, exact_subtotal, now)?)
        }
        None => None,
    };

    let exact_discount = applied.as_ref().map_or(Decimal::ZERO, |a| a.discount);
    let exact_grand = exact_subtotal - exact_discount + policy.shipping.to_decimal();

    // The discount is whatever separates the two rounded totals, so
    // subtotal - coupon_discount + shipping == grand_total holds to the cent.
    let subtotal = Money::from_decimal_cents(exact_subtotal);
    let grand_total = Money::from_decimal_cents(exact_grand);
    let coupon_discount = subtotal + policy.shipping - grand_total;

    Ok(Quote {
        lines,
        tier: request.tier,
        subtotal,
        quantity_savings: Money::from_decimal_cents(original_subtotal.to_decimal() - exact_subtotal),
        coupon_id: applied.as_ref().map(|a| a.coupon_id.clone()),
        coupon_code: applied.map(|a| a.code),
        coupon_discount,
        shipping: policy.shipping,
        grand_total,
    })
}

fn active_product<'c>(catalog: &'c CatalogSnapshot, product_id: &str) -> CoreResult<&'c Product> {
    let product = catalog
        .products
        .get(product_id)
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

    if !product.is_active() {
        return Err(CoreError::ProductUnavailable {
            product_id: product_id.to_string(),
        });
    }

    Ok(product)
}

/// Checks each variant against the SUM of the quantities naming it.
fn check_stock(request: &QuoteRequest, catalog: &CatalogSnapshot) -> CoreResult<()> {
    let mut demand: BTreeMap<&str, i64> = BTreeMap::new();

    for line in &request.lines {
        active_product(catalog, &line.product_id)?;

        let Some(variant_id) = line.variant_id.as_deref() else {
            continue;
        };

        let belongs = catalog
            .variants
            .get(variant_id)
            .is_some_and(|v| v.product_id == line.product_id);
        if !belongs {
            return Err(CoreError::VariantNotFound {
                variant_id: variant_id.to_string(),
                product_id: line.product_id.clone(),
            });
        }

        *demand.entry(variant_id).or_insert(0) += line.quantity;
    }

    for (variant_id, requested) in demand {
        let available = catalog.variants.get(variant_id).map_or(0, |v| v.stock);
        if available < requested {
            return Err(CoreError::InsufficientStock {
                variant_id: variant_id.to_string(),
                available,
                requested,
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CouponRejection;
    use crate::types::{CouponKind, LineRequest, ProductStatus, RuleKind};
    use chrono::Duration;

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            status: ProductStatus::Active,
            price_cents: price,
            offer_price_cents: None,
            wholesale_price_cents: None,
            subcategory_id: Some("tea".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn variant(id: &str, product_id: &str, stock: i64) -> ProductVariant {
        ProductVariant {
            id: id.to_string(),
            product_id: product_id.to_string(),
            label: "Default".to_string(),
            sku: None,
            stock,
            updated_at: Utc::now(),
        }
    }

    fn line(product_id: &str, variant_id: Option<&str>, quantity: i64) -> LineRequest {
        LineRequest {
            product_id: product_id.to_string(),
            variant_id: variant_id.map(str::to_string),
            quantity,
        }
    }

    fn request(lines: Vec<LineRequest>, coupon_code: Option<&str>) -> QuoteRequest {
        QuoteRequest {
            lines,
            coupon_code: coupon_code.map(str::to_string),
            tier: TenderTier::Retail,
        }
    }

    fn catalog() -> CatalogSnapshot {
        let mut catalog = CatalogSnapshot::default();
        catalog.products.insert("p-1".into(), product("p-1", 10_000));
        catalog.variants.insert("v-1".into(), variant("v-1", "p-1", 20));
        catalog
    }

    fn spring_coupon() -> Coupon {
        Coupon {
            id: "c-1".to_string(),
            code: "SPRING".to_string(),
            kind: CouponKind::Fixed,
            value: 5_000,
            max_discount_cents: None,
            min_order_cents: 50_000,
            valid_from: Utc::now() - Duration::days(1),
            valid_until: Utc::now() + Duration::days(1),
            usage_limit: Some(10),
            used_count: 0,
            is_active: true,
        }
    }

    fn quote(request: &QuoteRequest, catalog: &CatalogSnapshot) -> CoreResult<Quote> {
        assemble_quote(request, catalog, &QuotePolicy::default(), Utc::now())
    }

    #[test]
    fn test_bulk_discount_quote() {
        let mut catalog = catalog();
        catalog.rules.push(QuantityPriceRule {
            id: "r-10".to_string(),
            subcategory_id: "tea".to_string(),
            threshold: 10,
            kind: RuleKind::Percentage,
            value: 1500,
            is_active: true,
        });

        let q = quote(&request(vec![line("p-1", Some("v-1"), 12)], None), &catalog).unwrap();

        let l = &q.lines[0];
        assert_eq!(l.original_line_total.cents(), 120_000);
        assert_eq!(l.line_total.cents(), 102_000);
        assert_eq!(l.savings.cents(), 18_000);
        assert_eq!(l.unit_price.cents(), 8_500);
        assert_eq!(q.subtotal.cents(), 102_000);
        assert_eq!(q.quantity_savings.cents(), 18_000);
        assert_eq!(q.grand_total.cents(), 102_000);
    }

    #[test]
    fn test_fixed_coupon_quote() {
        let mut catalog = catalog();
        catalog.coupon = Some(spring_coupon());

        let q = quote(&request(vec![line("p-1", Some("v-1"), 6)], Some(" spring ")), &catalog).unwrap();

        assert_eq!(q.subtotal.cents(), 60_000);
        assert_eq!(q.coupon_discount.cents(), 5_000);
        assert_eq!(q.grand_total.cents(), 55_000);
        assert_eq!(q.coupon_code.as_deref(), Some("SPRING"));
        assert_eq!(q.coupon_id.as_deref(), Some("c-1"));
    }

    #[test]
    fn test_coupon_below_minimum() {
        let mut catalog = catalog();
        catalog.coupon = Some(spring_coupon());

        let err = quote(&request(vec![line("p-1", None, 4)], Some("SPRING")), &catalog).unwrap_err();
        assert!(matches!(
            err,
            CoreError::CouponInvalid { reason: CouponRejection::BelowMinimum { .. }, .. }
        ));
    }

    #[test]
    fn test_unknown_coupon_code() {
        let err = quote(&request(vec![line("p-1", None, 1)], Some("GHOST")), &catalog()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::CouponInvalid { reason: CouponRejection::NotFound, .. }
        ));
    }

    #[test]
    fn test_shipping_is_added() {
        let policy = QuotePolicy {
            shipping: Money::from_cents(250),
        };
        let q = assemble_quote(&request(vec![line("p-1", None, 1)], None), &catalog(), &policy, Utc::now()).unwrap();
        assert_eq!(q.shipping.cents(), 250);
        assert_eq!(q.grand_total.cents(), 10_250);
    }

    #[test]
    fn test_no_items() {
        assert!(matches!(quote(&request(vec![], None), &catalog()), Err(CoreError::NoItems)));
    }

    #[test]
    fn test_missing_and_inactive_products() {
        let err = quote(&request(vec![line("p-404", None, 1)], None), &catalog()).unwrap_err();
        assert!(matches!(err, CoreError::ProductNotFound(id) if id == "p-404"));

        let mut catalog = catalog();
        if let Some(p) = catalog.products.get_mut("p-1") {
            p.status = ProductStatus::Inactive;
        }
        let err = quote(&request(vec![line("p-1", None, 1)], None), &catalog).unwrap_err();
        assert!(matches!(err, CoreError::ProductUnavailable { .. }));
    }

    #[test]
    fn test_variant_of_other_product_is_rejected() {
        let mut catalog = catalog();
        catalog.products.insert("p-2".into(), product("p-2", 500));
        let err = quote(&request(vec![line("p-2", Some("v-1"), 1)], None), &catalog).unwrap_err();
        assert!(matches!(err, CoreError::VariantNotFound { .. }));
    }

    #[test]
    fn test_duplicate_variant_lines_are_summed_for_stock() {
        let catalog = catalog();
        let ok = request(vec![line("p-1", Some("v-1"), 10), line("p-1", Some("v-1"), 10)], None);
        assert!(quote(&ok, &catalog).is_ok());

        let over = request(vec![line("p-1", Some("v-1"), 15), line("p-1", Some("v-1"), 6)], None);
        let err = quote(&over, &catalog).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 20, requested: 21, .. }
        ));
    }

    #[test]
    fn test_wholesale_tier_prices() {
        let mut catalog = catalog();
        if let Some(p) = catalog.products.get_mut("p-1") {
            p.wholesale_price_cents = Some(7_000);
            p.offer_price_cents = Some(9_000);
        }
        let mut req = request(vec![line("p-1", None, 2)], None);
        assert_eq!(quote(&req, &catalog).unwrap().subtotal.cents(), 18_000);

        req.tier = TenderTier::Wholesale;
        assert_eq!(quote(&req, &catalog).unwrap().subtotal.cents(), 14_000);
    }

    #[test]
    fn test_rounds_once_on_exposure() {
        let mut catalog = catalog();
        catalog.products.insert("p-cheap".into(), product("p-cheap", 111));
        catalog.rules.push(QuantityPriceRule {
            id: "r".to_string(),
            subcategory_id: "tea".to_string(),
            threshold: 2,
            kind: RuleKind::Percentage,
            value: 1500,
            is_active: true,
        });

        // 100 lines of 3 × 1.11 at 15% off = 100 × 283.05 cents
        let lines = (0..100).map(|_| line("p-cheap", None, 3)).collect();
        let q = quote(&request(lines, None), &catalog).unwrap();
        assert_eq!(q.subtotal.cents(), 28_305);
    }

    #[test]
    fn test_exposed_totals_add_up_at_half_cents() {
        let mut catalog = catalog();
        catalog.products.insert("p-half".into(), product("p-half", 565));
        catalog.rules.push(QuantityPriceRule {
            id: "r-half".to_string(),
            subcategory_id: "tea".to_string(),
            threshold: 1,
            kind: RuleKind::Percentage,
            value: 5000,
            is_active: true,
        });
        catalog.coupon = Some(Coupon {
            kind: CouponKind::Fixed,
            value: 3,
            min_order_cents: 0,
            ..spring_coupon()
        });
        let policy = QuotePolicy {
            shipping: Money::from_cents(100),
        };

        // 282.5 - 3 + 100 = 379.5; each total alone rounds to even
        let req = request(vec![line("p-half", None, 1)], Some("SPRING"));
        let q = assemble_quote(&req, &catalog, &policy, Utc::now()).unwrap();

        assert_eq!(q.subtotal.cents(), 282);
        assert_eq!(q.grand_total.cents(), 380);
        assert_eq!(q.coupon_discount.cents(), 2);
        assert_eq!(q.subtotal - q.coupon_discount + q.shipping, q.grand_total);
    }

    #[test]
    fn test_same_inputs_same_quote() {
        let mut catalog = catalog();
        catalog.coupon = Some(spring_coupon());
        let req = request(vec![line("p-1", Some("v-1"), 7)], Some("SPRING"));

        let first = quote(&req, &catalog).unwrap();
        let second = quote(&req, &catalog).unwrap();
        assert_eq!(first, second);
        assert!(first.same_totals(&second));
    }

    #[test]
    fn test_variant_demand() {
        let q = quote(
            &request(vec![line("p-1", Some("v-1"), 2), line("p-1", Some("v-1"), 3), line("p-1", None, 1)], None),
            &catalog(),
        )
        .unwrap();
        let demand = q.variant_demand();
        assert_eq!(demand.len(), 1);
        assert_eq!(demand["v-1"], 5);
    }
}
