//! # settle-checkout: Checkout Services
//!
//! Orchestrates quoting, payment initiation, settlement, refunds and
//! fulfilment over the pure rules in `settle-core`, the transactions in
//! `settle-db` and the providers in `settle-gateway`.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  OrderQuoteBuilder ──► PaymentIntentInitiator ──► buyer pays            │
//! │   (catalog → Quote)     (intent PENDING)              │                 │
//! │                                                       ▼                 │
//! │                         SettlementCommitter::verify_and_commit          │
//! │                          (intent VERIFIED → COMMITTED, Order CONFIRMED) │
//! │                                       │                                 │
//! │                 ┌─────────────────────┼──────────────────────┐          │
//! │                 ▼                     ▼                      ▼          │
//! │        OrderStatusService     RefundCoordinator      NotificationOutbox │
//! │        (fulfilment steps)     (gateway, then DB)     (after each write) │
//! │                                                                         │
//! │  settle-worker: IntentSweeper + NotificationDispatcher on timers        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every service is constructed from its dependencies and holds no
//! mutable state of its own; the database is the only shared state.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod error;
pub mod initiate;
pub mod notify;
pub mod orders;
pub mod quote;
pub mod refund;
pub mod settlement;
pub mod sweep;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, SystemClock};
pub use config::{CheckoutConfig, DatabaseSettings, PricingSettings, WorkerSettings};
pub use error::{CheckoutError, CheckoutResult};
pub use initiate::{InitiateRequest, InitiatedPayment, PaymentIntentInitiator};
pub use notify::{
    DispatchReport, LogNotifier, NotificationDispatcher, NotificationOutbox, Notifier, NotifyError,
};
pub use orders::OrderStatusService;
pub use quote::OrderQuoteBuilder;
pub use refund::RefundCoordinator;
pub use settlement::{Settlement, SettlementCommitter};
pub use sweep::IntentSweeper;
