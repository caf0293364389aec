//! # Order Quote Builder
//!
//! Loads the catalog facts a request names and prices it.
//!
//! ```text
//! QuoteRequest
//!     │
//!     ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │ load_catalog                                              │
//! │   products_by_ids ──► subcategories ──► active rules      │
//! │   variants_by_ids                                         │
//! │   coupon by normalized code                               │
//! └───────────────────────────────────────────────────────────┘
//!     │ CatalogSnapshot
//!     ▼
//! settle_core::quote::assemble_quote  (pure, deterministic)
//!     │
//!     ▼
//! Quote (never persisted on its own)
//! ```
//!
//! The same builder runs at initiation and again at commit.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use settle_core::quote::{assemble_quote, CatalogSnapshot, QuotePolicy};
use settle_core::validation::normalize_coupon_code;
use settle_core::{CoreError, Quote, QuoteRequest};
use settle_db::Database;
use tracing::debug;

use crate::error::CheckoutResult;

#[derive(Debug, Clone)]
pub struct OrderQuoteBuilder {
    db: Database,
    policy: QuotePolicy,
}

impl OrderQuoteBuilder {
    pub fn new(db: Database, policy: QuotePolicy) -> Self {
        OrderQuoteBuilder { db, policy }
    }

    pub fn policy(&self) -> &QuotePolicy {
        &self.policy
    }

    /// Prices `request` against the current catalog.
    pub async fn build(&self, request: &QuoteRequest, now: DateTime<Utc>) -> CheckoutResult<Quote> {
        if request.lines.is_empty() {
            return Err(CoreError::NoItems.into());
        }

        let catalog = self.load_catalog(request).await?;
        let quote = assemble_quote(request, &catalog, &self.policy, now)?;

        debug!(
            lines = quote.lines.len(),
            subtotal = quote.subtotal.cents(),
            discount = quote.coupon_discount.cents(),
            total = quote.grand_total.cents(),
            "Quote built"
        );

        Ok(quote)
    }

    async fn load_catalog(&self, request: &QuoteRequest) -> CheckoutResult<CatalogSnapshot> {
        let catalog = self.db.catalog();

        let product_ids: Vec<String> = request
            .lines
            .iter()
            .map(|l| l.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let variant_ids: Vec<String> = request
            .lines
            .iter()
            .filter_map(|l| l.variant_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let products = catalog.products_by_ids(&product_ids).await?;
        let variants = if variant_ids.is_empty() {
            Default::default()
        } else {
            catalog.variants_by_ids(&variant_ids).await?
        };

        let subcategories: Vec<String> = products
            .values()
            .filter_map(|p| p.subcategory_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let rules = catalog.rules_for_subcategories(&subcategories).await?;

        let coupon = match request.coupon_code.as_deref().and_then(normalize_coupon_code) {
            Some(code) => self.db.coupons().get_by_code(&code).await?,
            None => None,
        };

        Ok(CatalogSnapshot {
            products,
            variants,
            rules,
            coupon,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
