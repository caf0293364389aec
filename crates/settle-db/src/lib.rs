//! # settle-db
//!
//! SQLite storage for Settle. Every write that touches shared state
//! (stock, coupon usage, intent status, order status) happens here, in one
//! transaction, behind a guard that fails loudly instead of overselling.
//!
//! ```text
//!   settle-checkout
//!        │ db.orders().commit(&new_order, now)
//!        ▼
//!   Database ── SqlitePool (WAL, busy wait) ── settle.db
//!        │
//!        ├─ repository::catalog       products, variants, rules
//!        ├─ repository::coupon        codes, guarded redemption
//!        ├─ repository::intent        payment intent snapshots
//!        ├─ repository::order         commit / refund / transition
//!        └─ repository::notification  outbox rows
//!
//!   migrations/sqlite/*.sql ── embedded, applied on open
//! ```
//!
//! ```rust,ignore
//! use settle_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("settle.db")).await?;
//! let order = db.orders().get_by_number("ORD-20261016-4F3A9C1B").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::catalog::CatalogRepository;
pub use repository::coupon::CouponRepository;
pub use repository::intent::IntentRepository;
pub use repository::notification::NotificationOutboxRepository;
pub use repository::order::{CommitOutcome, NewOrder, OrderRepository};
