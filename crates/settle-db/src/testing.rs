//! Fixtures shared by the repository tests.

use chrono::{Duration, Utc};
use settle_core::{
    BuyerInfo, Coupon, CouponKind, IntentStatus, LineRequest, Money, Order, OrderStatus, PaymentIntent,
    PaymentStatus, Product, ProductStatus, ProductVariant, QuantityPriceRule, Quote, QuoteLine, QuoteRequest,
    RuleKind, Tender, TenderTier,
};

use crate::repository::order::NewOrder;
use crate::{Database, DbConfig};

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub fn product(id: &str, price_cents: i64) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {id}"),
        status: ProductStatus::Active,
        price_cents,
        offer_price_cents: None,
        wholesale_price_cents: None,
        subcategory_id: Some("tea".to_string()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn variant(id: &str, product_id: &str, stock: i64) -> ProductVariant {
    ProductVariant {
        id: id.to_string(),
        product_id: product_id.to_string(),
        label: "Default".to_string(),
        sku: None,
        stock,
        updated_at: Utc::now(),
    }
}

pub fn rule(id: &str, threshold: i64, kind: RuleKind, value: i64) -> QuantityPriceRule {
    QuantityPriceRule {
        id: id.to_string(),
        subcategory_id: "tea".to_string(),
        threshold,
        kind,
        value,
        is_active: true,
    }
}

pub fn coupon(id: &str, code: &str, kind: CouponKind, value: i64, usage_limit: Option<i64>) -> Coupon {
    Coupon {
        id: id.to_string(),
        code: code.to_string(),
        kind,
        value,
        max_discount_cents: None,
        min_order_cents: 0,
        valid_from: Utc::now() - Duration::days(1),
        valid_until: Utc::now() + Duration::days(30),
        usage_limit,
        used_count: 0,
        is_active: true,
    }
}

/// A single-line quote for product `p-1`, no rules, no coupon.
pub fn quote_for(variant_id: &str, quantity: i64, unit_cents: i64) -> Quote {
    let unit = Money::from_cents(unit_cents);
    let total = unit.multiply_quantity(quantity);
    Quote {
        lines: vec![QuoteLine {
            product_id: "p-1".to_string(),
            variant_id: Some(variant_id.to_string()),
            product_name: "Product p-1".to_string(),
            quantity,
            base_unit_price: unit,
            unit_price: unit,
            line_total: total,
            original_line_total: total,
            savings: Money::zero(),
            applied_rule_id: None,
        }],
        tier: TenderTier::Retail,
        subtotal: total,
        quantity_savings: Money::zero(),
        coupon_id: None,
        coupon_code: None,
        coupon_discount: Money::zero(),
        shipping: Money::zero(),
        grand_total: total,
    }
}

pub fn buyer() -> BuyerInfo {
    BuyerInfo {
        name: "Ayesha".to_string(),
        email: "ayesha@example.com".to_string(),
        phone: None,
        shipping_address: "12 Canal Road".to_string(),
    }
}

pub fn intent(gateway_ref: &str, expires_at: chrono::DateTime<Utc>) -> PaymentIntent {
    let now = Utc::now();
    PaymentIntent {
        gateway_ref: gateway_ref.to_string(),
        tender: Tender::HostedCheckout,
        status: IntentStatus::Pending,
        request: QuoteRequest {
            lines: vec![LineRequest {
                product_id: "p-1".to_string(),
                variant_id: Some("v-1".to_string()),
                quantity: 1,
            }],
            coupon_code: None,
            tier: TenderTier::Retail,
        },
        quote: quote_for("v-1", 1, 1_000),
        buyer: buyer(),
        gateway_payment_id: None,
        failure_reason: None,
        order_id: None,
        created_at: now,
        expires_at,
        updated_at: now,
    }
}

/// Inserts `p-1` (1000 cents) with variant `v-1`.
pub async fn seed_catalog(db: &Database, stock: i64) {
    db.catalog().insert_product(&product("p-1", 1_000)).await.unwrap();
    db.catalog().insert_variant(&variant("v-1", "p-1", stock)).await.unwrap();
}

/// Seeds the catalog and commits a cash-on-delivery order for one unit.
pub async fn cod_order(db: &Database) -> Order {
    seed_catalog(db, 5).await;
    let new = NewOrder {
        quote: quote_for("v-1", 1, 1_000),
        buyer: buyer(),
        tender: Tender::CashOnDelivery,
        status: OrderStatus::Confirmed,
        payment_status: PaymentStatus::Pending,
        gateway_ref: None,
        gateway_payment_id: None,
        note: "Order placed".to_string(),
    };
    db.orders().commit(&new, Utc::now()).await.unwrap().into_order()
}
