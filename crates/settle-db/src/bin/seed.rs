//! # Seed Data Generator
//!
//! Populates the database with a small demo catalog for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./settle.db
//! cargo run -p settle-db --bin seed
//!
//! # Specify database path and stock per variant
//! cargo run -p settle-db --bin seed -- --db ./data/settle.db --stock 25
//! ```
//!
//! ## Generated Data
//! - Three subcategories (tea, coffee, cups), each with products and variants
//! - Bulk rules: tea 10+ at 15% off, coffee 3-pack at a fixed total
//! - Coupons: `WELCOME10` (10%, capped), `FLAT50` (50.00 off 500.00+)

use chrono::{Duration, Utc};
use std::env;
use uuid::Uuid;

use settle_core::{Coupon, CouponKind, Product, ProductStatus, ProductVariant, QuantityPriceRule, RuleKind};
use settle_db::{Database, DbConfig};

/// (subcategory, product name, price, offer price, wholesale price, variant labels)
const CATALOG: &[(&str, &str, i64, Option<i64>, Option<i64>, &[&str])] = &[
    ("tea", "Green Tea 250g", 1_200, None, Some(900), &["Loose", "Bags"]),
    ("tea", "Black Tea 500g", 1_800, Some(1_600), Some(1_350), &["Loose"]),
    ("coffee", "House Blend 1kg", 4_500, None, Some(3_800), &["Whole Bean", "Ground"]),
    ("coffee", "Decaf 500g", 2_900, Some(2_500), None, &["Ground"]),
    ("cups", "Ceramic Mug", 1_500, None, None, &["White", "Black", "Red"]),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let db_path = flag(&args, "--db").unwrap_or_else(|| "settle.db".to_string());
    let stock: i64 = flag(&args, "--stock").and_then(|s| s.parse().ok()).unwrap_or(50);

    println!("Seeding {db_path} (stock {stock} per variant)");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let now = Utc::now();
    let catalog = db.catalog();

    let mut variants = 0;
    for (subcategory, name, price, offer, wholesale, labels) in CATALOG {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: (*name).to_string(),
            status: ProductStatus::Active,
            price_cents: *price,
            offer_price_cents: *offer,
            wholesale_price_cents: *wholesale,
            subcategory_id: Some((*subcategory).to_string()),
            created_at: now,
            updated_at: now,
        };
        catalog.insert_product(&product).await?;

        for label in labels.iter() {
            catalog
                .insert_variant(&ProductVariant {
                    id: Uuid::new_v4().to_string(),
                    product_id: product.id.clone(),
                    label: (*label).to_string(),
                    sku: None,
                    stock,
                    updated_at: now,
                })
                .await?;
            variants += 1;
        }
    }

    for (subcategory, threshold, kind, value) in [
        ("tea", 10, RuleKind::Percentage, 1_500),
        ("tea", 25, RuleKind::Percentage, 2_500),
        ("coffee", 3, RuleKind::FixedTotal, 11_000),
    ] {
        catalog
            .insert_rule(&QuantityPriceRule {
                id: Uuid::new_v4().to_string(),
                subcategory_id: subcategory.to_string(),
                threshold,
                kind,
                value,
                is_active: true,
            })
            .await?;
    }

    for (code, kind, value, max_discount, min_order, usage_limit) in [
        ("WELCOME10", CouponKind::Percentage, 1_000, Some(2_000), 0, None),
        ("FLAT50", CouponKind::Fixed, 5_000, None, 50_000, Some(100)),
    ] {
        db.coupons()
            .insert(&Coupon {
                id: Uuid::new_v4().to_string(),
                code: code.to_string(),
                kind,
                value,
                max_discount_cents: max_discount,
                min_order_cents: min_order,
                valid_from: now,
                valid_until: now + Duration::days(90),
                usage_limit,
                used_count: 0,
                is_active: true,
            })
            .await?;
    }

    println!("  Products: {}", CATALOG.len());
    println!("  Variants: {variants}");
    println!("  Rules:    3");
    println!("  Coupons:  WELCOME10, FLAT50");
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
