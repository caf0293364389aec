//! # Coupon Evaluation
//!
//! Decides whether a coupon applies to a subtotal and how much it takes off.
//!
//! ## Checks (in order)
//! ```text
//! code known? ──► active? ──► valid_from ≤ now ≤ valid_until?
//!      ──► used_count < usage_limit? ──► subtotal ≥ min_order?
//!      ──► discount
//!            PERCENTAGE: subtotal × value%, capped at max_discount
//!            FIXED:      value
//!          clamped to [0, subtotal]
//! ```
//!
//! The usage check here is advisory. The authoritative check is the guarded
//! increment inside the commit transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{CoreError, CoreResult, CouponRejection};
use crate::money::{Money, Rate};
use crate::types::{Coupon, CouponKind};

/// A coupon that passed every check, with its exact discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    pub coupon_id: String,
    pub code: String,
    /// Exact discount in cents, within `[0, subtotal]`.
    pub discount: Decimal,
}

/// Evaluates `coupon` (looked up by `code`) against an exact subtotal.
pub fn evaluate_coupon(
    code: &str,
    coupon: Option<&Coupon>,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> CoreResult<AppliedCoupon> {
    let reject = |reason| CoreError::CouponInvalid {
        code: code.to_string(),
        reason,
    };

    let coupon = coupon.ok_or_else(|| reject(CouponRejection::NotFound))?;

    if !coupon.is_active {
        return Err(reject(CouponRejection::Inactive));
    }
    if now < coupon.valid_from {
        return Err(reject(CouponRejection::NotYetValid));
    }
    if now > coupon.valid_until {
        return Err(reject(CouponRejection::Expired));
    }
    if !coupon.has_redemptions_left() {
        return Err(CoreError::CouponExhausted {
            code: coupon.code.clone(),
        });
    }
    if subtotal < Decimal::from(coupon.min_order_cents) {
        return Err(reject(CouponRejection::BelowMinimum {
            minimum: coupon.min_order_cents,
            subtotal: Money::from_decimal_cents(subtotal).cents(),
        }));
    }

    Ok(AppliedCoupon {
        coupon_id: coupon.id.clone(),
        code: coupon.code.clone(),
        discount: coupon_discount(coupon, subtotal),
    })
}

/// Raw discount for a coupon that already passed eligibility.
pub fn coupon_discount(coupon: &Coupon, subtotal: Decimal) -> Decimal {
    let raw = match coupon.kind {
        CouponKind::Percentage => {
            let rate = Rate::from_bps(u32::try_from(coupon.value).unwrap_or(0));
            let discount = subtotal * rate.fraction();
            match coupon.max_discount_cents {
                Some(cap) => discount.min(Decimal::from(cap)),
                None => discount,
            }
        }
        CouponKind::Fixed => Decimal::from(coupon.value),
    };

    raw.max(Decimal::ZERO).min(subtotal.max(Decimal::ZERO))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(kind: CouponKind, value: i64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: "c-1".to_string(),
            code: "SPRING".to_string(),
            kind,
            value,
            max_discount_cents: None,
            min_order_cents: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            usage_limit: None,
            used_count: 0,
            is_active: true,
        }
    }

    fn eval(c: &Coupon, subtotal: i64) -> CoreResult<AppliedCoupon> {
        evaluate_coupon(&c.code, Some(c), Decimal::from(subtotal), Utc::now())
    }

    #[test]
    fn test_fixed_coupon_above_minimum() {
        let mut c = coupon(CouponKind::Fixed, 5_000);
        c.min_order_cents = 50_000;

        let applied = eval(&c, 60_000).unwrap();
        assert_eq!(applied.discount, Decimal::from(5_000));
        assert_eq!(applied.coupon_id, "c-1");
    }

    #[test]
    fn test_below_minimum_is_rejected() {
        let mut c = coupon(CouponKind::Fixed, 5_000);
        c.min_order_cents = 50_000;

        let err = eval(&c, 40_000).unwrap_err();
        assert!(matches!(
            err,
            CoreError::CouponInvalid {
                reason: CouponRejection::BelowMinimum { minimum: 50_000, subtotal: 40_000 },
                ..
            }
        ));
    }

    #[test]
    fn test_percentage_is_capped() {
        let mut c = coupon(CouponKind::Percentage, 2_000);
        c.max_discount_cents = Some(1_500);

        assert_eq!(eval(&c, 5_000).unwrap().discount, Decimal::from(1_000));
        assert_eq!(eval(&c, 50_000).unwrap().discount, Decimal::from(1_500));
    }

    #[test]
    fn test_discount_never_exceeds_subtotal() {
        let fixed = coupon(CouponKind::Fixed, 9_000);
        assert_eq!(eval(&fixed, 3_000).unwrap().discount, Decimal::from(3_000));

        let over = coupon(CouponKind::Percentage, 25_000);
        assert_eq!(eval(&over, 3_000).unwrap().discount, Decimal::from(3_000));

        let negative = coupon(CouponKind::Fixed, -100);
        assert_eq!(eval(&negative, 3_000).unwrap().discount, Decimal::ZERO);
    }

    #[test]
    fn test_discount_bounds_hold_across_subtotals() {
        let mut c = coupon(CouponKind::Percentage, 3_333);
        c.max_discount_cents = Some(777);
        for subtotal in (0..20_000).step_by(137) {
            let discount = eval(&c, subtotal).unwrap().discount;
            assert!(discount <= Decimal::from(subtotal));
            assert!(discount <= Decimal::from(777));
            assert!(discount >= Decimal::ZERO);
        }
    }

    #[test]
    fn test_validity_window_and_state() {
        let mut c = coupon(CouponKind::Fixed, 100);
        c.is_active = false;
        assert!(matches!(
            eval(&c, 1_000),
            Err(CoreError::CouponInvalid { reason: CouponRejection::Inactive, .. })
        ));

        let mut c = coupon(CouponKind::Fixed, 100);
        c.valid_until = Utc::now() - Duration::hours(1);
        assert!(matches!(
            eval(&c, 1_000),
            Err(CoreError::CouponInvalid { reason: CouponRejection::Expired, .. })
        ));

        let mut c = coupon(CouponKind::Fixed, 100);
        c.valid_from = Utc::now() + Duration::hours(1);
        assert!(matches!(
            eval(&c, 1_000),
            Err(CoreError::CouponInvalid { reason: CouponRejection::NotYetValid, .. })
        ));
    }

    #[test]
    fn test_exhausted_and_unknown() {
        let mut c = coupon(CouponKind::Fixed, 100);
        c.usage_limit = Some(3);
        c.used_count = 3;
        assert!(matches!(eval(&c, 1_000), Err(CoreError::CouponExhausted { .. })));

        let unknown = evaluate_coupon("NOPE", None, Decimal::from(1_000), Utc::now());
        assert!(matches!(
            unknown,
            Err(CoreError::CouponInvalid { reason: CouponRejection::NotFound, .. })
        ));
    }
}
