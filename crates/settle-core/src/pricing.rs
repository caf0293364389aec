//! # Pricing Resolver
//!
//! Best price for one order line given the quantity-tier rules of its
//! pricing subcategory.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  base unit price × quantity = original line total                       │
//! │                                                                         │
//! │  rules (same subcategory, active, threshold ≤ quantity)                 │
//! │     │                                                                   │
//! │     ├── PERCENTAGE  ──► original × (1 − value%)                         │
//! │     └── FIXED_TOTAL ──► value  (replaces the WHOLE line total)          │
//! │                                                                         │
//! │  degenerate (percentage > 100%, negative total) ──► warn, ignore        │
//! │                                                                         │
//! │  best = min(candidate) if it beats the original, else no discount       │
//! │  ties ──► higher threshold, then smaller rule id                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Line totals stay exact (`Decimal` cents). Quote assembly rounds them
//! only when it exposes them.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use tracing::warn;

use crate::money::Money;
use crate::types::{QuantityPriceRule, RuleDiscount};

/// The priced result for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePrice {
    pub quantity: i64,
    pub base_unit_price: Money,
    /// `base_unit_price × quantity`.
    pub original_line_total: Money,
    /// Exact line total in cents, unrounded.
    pub line_total: Decimal,
    pub applied_rule_id: Option<String>,
}

impl LinePrice {
    /// Exact effective price per unit.
    pub fn unit_effective_price(&self) -> Decimal {
        if self.quantity == 0 {
            return self.line_total;
        }
        self.line_total / Decimal::from(self.quantity)
    }

    /// Exact savings against the undiscounted line.
    pub fn savings(&self) -> Decimal {
        self.original_line_total.to_decimal() - self.line_total
    }

    pub fn is_discounted(&self) -> bool {
        self.applied_rule_id.is_some()
    }
}

/// Resolves line prices against a set of quantity rules.
///
/// ## Example
/// ```rust
/// use settle_core::money::Money;
/// use settle_core::pricing::PricingResolver;
/// use settle_core::types::{QuantityPriceRule, RuleKind};
///
/// let rules = vec![QuantityPriceRule {
///     id: "bulk-10".into(),
///     subcategory_id: "tea".into(),
///     threshold: 10,
///     kind: RuleKind::Percentage,
///     value: 1500,
///     is_active: true,
/// }];
///
/// let line = PricingResolver::new(&rules).resolve(Money::from_cents(10_000), Some("tea"), 12);
/// assert_eq!(Money::from_decimal_cents(line.line_total).cents(), 102_000);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PricingResolver<'a> {
    rules: &'a [QuantityPriceRule],
}

impl<'a> PricingResolver<'a> {
    pub fn new(rules: &'a [QuantityPriceRule]) -> Self {
        Self { rules }
    }

    /// Prices `quantity` units at `base_unit_price`.
    ///
    /// A product without a subcategory never matches a rule.
    pub fn resolve(&self, base_unit_price: Money, subcategory_id: Option<&str>, quantity: i64) -> LinePrice {
        let original = base_unit_price.multiply_quantity(quantity);
        let original_exact = original.to_decimal();

        let best = subcategory_id.and_then(|subcategory| {
            self.rules
                .iter()
                .filter(|rule| rule.subcategory_id == subcategory && rule.applies_to(quantity))
                .filter_map(|rule| candidate_total(rule, original_exact).map(|total| (total, rule)))
                .filter(|(total, _)| *total < original_exact)
                .min_by(|a, b| compare_candidates(*a, *b))
        });

        match best {
            Some((total, rule)) => LinePrice {
                quantity,
                base_unit_price,
                original_line_total: original,
                line_total: total,
                applied_rule_id: Some(rule.id.clone()),
            },
            None => LinePrice {
                quantity,
                base_unit_price,
                original_line_total: original,
                line_total: original_exact,
                applied_rule_id: None,
            },
        }
    }
}

/// Candidate line total for one rule, or `None` when the rule is degenerate.
fn candidate_total(rule: &QuantityPriceRule, original: Decimal) -> Option<Decimal> {
    match rule.discount() {
        RuleDiscount::Percentage(rate) if !rate.is_valid_percentage() => {
            warn!(rule_id = %rule.id, value = rule.value, "Percentage rule outside 0-100%, ignoring");
            None
        }
        RuleDiscount::Percentage(rate) => Some(original * rate.complement()),
        RuleDiscount::FixedTotal(total) if total.is_negative() => {
            warn!(rule_id = %rule.id, value = rule.value, "Fixed-total rule is negative, ignoring");
            None
        }
        RuleDiscount::FixedTotal(total) => Some(total.to_decimal()),
    }
}

/// Lower total wins; then higher threshold; then smaller id.
fn compare_candidates(
    (a_total, a_rule): (Decimal, &QuantityPriceRule),
    (b_total, b_rule): (Decimal, &QuantityPriceRule),
) -> Ordering {
    a_total
        .cmp(&b_total)
        .then_with(|| b_rule.threshold.cmp(&a_rule.threshold))
        .then_with(|| a_rule.id.cmp(&b_rule.id))
}

// =============================================================================
// Unit Tests
// =============================================================================
