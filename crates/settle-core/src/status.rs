//! # Status Machines
//!
//! Closed status enumerations with their transition tables. Every status
//! write in settle-db is a compare-and-set whose allowed "from" set comes
//! from here, so the table is the single source of truth.
//!
//! ## Payment Intent
//! ```text
//!                 ┌──────────┐  verified   ┌──────────┐  committed  ┌───────────┐
//!   initiate ───► │ PENDING  │ ──────────► │ VERIFIED │ ──────────► │ COMMITTED │
//!                 └────┬─────┘             └────┬─────┘             └───────────┘
//!                      │ gateway failed         │ commit rejected
//!                      │                        │ (stock / coupon / amount)
//!                      ▼                        ▼
//!                 ┌──────────┐             ┌──────────┐
//!                 │ EXPIRED  │             │  FAILED  │
//!                 └──────────┘             └──────────┘
//!                 (sweeper)
//! ```
//!
//! ## Order
//! ```text
//!  PENDING ──► CONFIRMED ──► PROCESSING ──► SHIPPED ──► DELIVERED
//!     │            │              │
//!     └────────────┴──────────────┴──► CANCELLED
//!
//!  any paid, not yet refunded ──────────► REFUNDED   (refund path only)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Intent Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Verified,
    Committed,
    Failed,
    Expired,
}

impl IntentStatus {
    pub const ALL: [IntentStatus; 5] = [
        IntentStatus::Pending,
        IntentStatus::Verified,
        IntentStatus::Committed,
        IntentStatus::Failed,
        IntentStatus::Expired,
    ];

    /// Statuses reachable in one step.
    ///
    /// `Verified → Verified` is allowed so a retried verification after a
    /// crash between verify and commit is a no-op instead of an error.
    pub fn allowed_transitions(&self) -> &'static [IntentStatus] {
        use IntentStatus::*;
        match self {
            Pending => &[Verified, Failed, Expired],
            Verified => &[Verified, Committed, Failed],
            Committed | Failed | Expired => &[],
        }
    }

    #[inline]
    pub fn can_transition_to(&self, to: IntentStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Every status from which `to` may be entered.
    pub fn sources_of(to: IntentStatus) -> Vec<IntentStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(to))
            .collect()
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn ensure_transition(&self, to: IntentStatus) -> CoreResult<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                entity: "payment intent",
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Verified => "verified",
            IntentStatus::Committed => "committed",
            IntentStatus::Failed => "failed",
            IntentStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Transitions available through the status service.
    /// `Refunded` is never listed: only a refund enters it.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Processing, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered],
            Delivered | Cancelled | Refunded => &[],
        }
    }

    #[inline]
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn ensure_transition(&self, to: OrderStatus) -> CoreResult<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                entity: "order",
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Order statuses from which a refund may start.
    pub fn refundable_from() -> &'static [OrderStatus] {
        use OrderStatus::*;
        &[Pending, Confirmed, Processing, Shipped, Delivered]
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
