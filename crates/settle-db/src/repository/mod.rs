//! # Repository Module
//!
//! Database repository implementations for Settle.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  settle-checkout service                                                │
//! │       │                                                                 │
//! │       │  db.orders().commit(&new_order, now)                            │
//! │       ▼                                                                 │
//! │  OrderRepository                                                        │
//! │  ├── commit(&self, new, now)       one transaction, guarded writes     │
//! │  ├── refund(&self, id, info, now)  one transaction                     │
//! │  └── transition(&self, ...)        one transaction                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! │  Every repository holds a cloned pool and is cheap to create.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products, variants, quantity rules
//! - [`CouponRepository`](coupon::CouponRepository) - Coupon lookup
//! - [`IntentRepository`](intent::IntentRepository) - Payment intent snapshots
//! - [`OrderRepository`](order::OrderRepository) - Orders and their transactions
//! - [`NotificationOutboxRepository`](notification::NotificationOutboxRepository) - Post-commit notifications

pub mod catalog;
pub mod coupon;
pub mod intent;
pub mod notification;
pub mod order;
