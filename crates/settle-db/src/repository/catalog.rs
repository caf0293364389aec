//! # Catalog Repository
//!
//! Read access to products, variants and quantity rules, plus the inserts
//! the seeder and tests use. Catalog management itself lives elsewhere.
//!
//! ## Batch Reads
//! ```text
//! quote for 30 lines ──► 3 queries, not 90
//!
//!   products_by_ids(ids)          WHERE id IN (SELECT value FROM json_each(?1))
//!   variants_by_ids(ids)          same
//!   rules_for_subcategories(ids)  same, active only
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;

use crate::error::DbResult;
use settle_core::{Product, ProductVariant, QuantityPriceRule};

/// Repository for catalog reads.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, status, price_cents, offer_price_cents,
                   wholesale_price_cents, subcategory_id, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Fetches every product in `ids`, keyed by id. Missing ids are absent.
    pub async fn products_by_ids(&self, ids: &[String]) -> DbResult<HashMap<String, Product>> {
        debug!(count = ids.len(), "Loading products");

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, status, price_cents, offer_price_cents,
                   wholesale_price_cents, subcategory_id, created_at, updated_at
            FROM products
            WHERE id IN (SELECT value FROM json_each(?1))
            "#,
        )
        .bind(serde_json::to_string(ids)?)
        .fetch_all(&self.pool)
        .await?;

        Ok(products.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    pub async fn get_variant(&self, id: &str) -> DbResult<Option<ProductVariant>> {
        let variant = sqlx::query_as::<_, ProductVariant>(
            "SELECT id, product_id, label, sku, stock, updated_at FROM product_variants WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    pub async fn variants_by_ids(&self, ids: &[String]) -> DbResult<HashMap<String, ProductVariant>> {
        let variants = sqlx::query_as::<_, ProductVariant>(
            r#"
            SELECT id, product_id, label, sku, stock, updated_at
            FROM product_variants
            WHERE id IN (SELECT value FROM json_each(?1))
            "#,
        )
        .bind(serde_json::to_string(ids)?)
        .fetch_all(&self.pool)
        .await?;

        Ok(variants.into_iter().map(|v| (v.id.clone(), v)).collect())
    }

    /// Active rules for the given subcategories.
    pub async fn rules_for_subcategories(&self, subcategory_ids: &[String]) -> DbResult<Vec<QuantityPriceRule>> {
        if subcategory_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rules = sqlx::query_as::<_, QuantityPriceRule>(
            r#"
            SELECT id, subcategory_id, threshold, kind, value, is_active
            FROM quantity_price_rules
            WHERE is_active = 1
              AND subcategory_id IN (SELECT value FROM json_each(?1))
            ORDER BY subcategory_id, threshold
            "#,
        )
        .bind(serde_json::to_string(subcategory_ids)?)
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }

    /// Current stock of a variant, if it exists.
    pub async fn stock_of(&self, variant_id: &str) -> DbResult<Option<i64>> {
        let stock = sqlx::query_scalar::<_, i64>("SELECT stock FROM product_variants WHERE id = ?1")
            .bind(variant_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(stock)
    }

    // =========================================================================
    // Writes (seeding and tests)
    // =========================================================================

    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, status, price_cents, offer_price_cents,
                wholesale_price_cents, subcategory_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.status)
        .bind(product.price_cents)
        .bind(product.offer_price_cents)
        .bind(product.wholesale_price_cents)
        .bind(&product.subcategory_id)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_variant(&self, variant: &ProductVariant) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_variants (id, product_id, label, sku, stock, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_id)
        .bind(&variant.label)
        .bind(&variant.sku)
        .bind(variant.stock)
        .bind(variant.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_rule(&self, rule: &QuantityPriceRule) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO quantity_price_rules (id, subcategory_id, threshold, kind, value, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.subcategory_id)
        .bind(rule.threshold)
        .bind(rule.kind)
        .bind(rule.value)
        .bind(rule.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrites a variant's stock (restocking, tests).
    pub async fn set_stock(&self, variant_id: &str, stock: i64, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE product_variants SET stock = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(variant_id)
            .bind(stock)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
