//! # Storage Errors
//!
//! Two sources feed [`DbError`]:
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────────────┐
//! │ sqlx::Error                  │      │ guarded UPDATE touched 0 rows    │
//! │  Database(code, message) ────┼──┐   │  stock / coupon / intent / order │
//! │  PoolTimedOut, PoolClosed    │  │   └────────────────┬─────────────────┘
//! └──────────────────────────────┘  │                    │ rollback, then
//!                                   ▼                    ▼ a typed variant
//!                    classify by SQLite extended result code
//!                                   │
//!                                   ▼
//!                               DbError ──► CheckoutError
//! ```
//!
//! Guard failures are not sqlx errors. Each repository rolls its
//! transaction back and returns the variant that says which guard lost.

use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `field` is the `table.column` SQLite names in the message.
    #[error("Duplicate value for {field}{}", value_suffix(.value))]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// stock < 0, used_count > usage_limit and the like.
    #[error("Check constraint violated: {message}")]
    CheckViolation { message: String },

    // =========================================================================
    // Guards
    // =========================================================================
    #[error("Insufficient stock for variant {variant_id}: available {available}, requested {requested}")]
    InsufficientStock {
        variant_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Coupon {coupon_id} has reached its usage limit")]
    CouponExhausted { coupon_id: String },

    #[error("Payment intent {gateway_ref} is {status}")]
    IntentNotClaimable { gateway_ref: String, status: String },

    /// Compare-and-set on a status column lost. `current` describes what
    /// the row holds now.
    #[error("{entity} {id} is {current}")]
    StatusConflict {
        entity: String,
        id: String,
        current: String,
    },

    // =========================================================================
    // Infrastructure
    // =========================================================================
    /// A JSON snapshot column could not be read or written.
    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot reach database: {0}")]
    ConnectionFailed(String),

    #[error("Schema migration failed: {0}")]
    MigrationFailed(String),

    #[error("Statement failed: {0}")]
    QueryFailed(String),

    /// Locked past the busy timeout.
    #[error("Database is busy: {0}")]
    Busy(String),

    #[error("No free database connection")]
    PoolExhausted,

    #[error("Unexpected database error: {0}")]
    Internal(String),
}

fn value_suffix(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!(": '{value}'")
    }
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn status_conflict(entity: impl Into<String>, id: impl Into<String>, current: impl ToString) -> Self {
        DbError::StatusConflict {
            entity: entity.into(),
            id: id.into(),
            current: current.to_string(),
        }
    }

    /// True for failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Busy(_) | DbError::PoolExhausted | DbError::ConnectionFailed(_)
        )
    }

    /// True when a UNIQUE constraint on `column` (e.g. `orders.gateway_ref`)
    /// was violated.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field.contains(column))
    }
}

// =============================================================================
// sqlx Conversion
// =============================================================================

// SQLite extended result codes.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_SNAPSHOT: &str = "517";
const SQLITE_BUSY_TIMEOUT: &str = "773";
const SQLITE_CONSTRAINT_CHECK: &str = "275";
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => classify(db_err.code().as_deref(), db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),
            sqlx::Error::RowNotFound => DbError::not_found("Row", "<query returned no rows>"),
            other => DbError::Internal(other.to_string()),
        }
    }
}

/// Maps a SQLite failure to a variant, by code first and message second.
fn classify(code: Option<&str>, message: &str) -> DbError {
    let named = |prefix: &str| message.split_once(prefix).map(|(_, rest)| rest.trim().to_string());

    match code {
        Some(SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY) => unique(named, message),
        Some(SQLITE_CONSTRAINT_FOREIGNKEY) => DbError::ForeignKeyViolation {
            message: message.to_string(),
        },
        Some(SQLITE_CONSTRAINT_CHECK) => DbError::CheckViolation {
            message: message.to_string(),
        },
        Some(SQLITE_BUSY | SQLITE_LOCKED | SQLITE_BUSY_SNAPSHOT | SQLITE_BUSY_TIMEOUT) => {
            DbError::Busy(message.to_string())
        }
        _ if message.starts_with("UNIQUE constraint failed") => unique(named, message),
        _ if message.starts_with("CHECK constraint failed") => DbError::CheckViolation {
            message: message.to_string(),
        },
        _ if message.contains("database is locked") => DbError::Busy(message.to_string()),
        _ => DbError::QueryFailed(message.to_string()),
    }
}

fn unique(named: impl Fn(&str) -> Option<String>, message: &str) -> DbError {
    DbError::UniqueViolation {
        field: named("failed:").unwrap_or_else(|| message.to_string()),
        value: String::new(),
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_code() {
        let err = classify(Some("2067"), "UNIQUE constraint failed: orders.gateway_ref");
        assert!(err.is_unique_violation_on("orders.gateway_ref"));
        assert!(!err.is_unique_violation_on("orders.order_number"));
        assert_eq!(err.to_string(), "Duplicate value for orders.gateway_ref");

        assert!(matches!(
            classify(Some("275"), "CHECK constraint failed: stock >= 0"),
            DbError::CheckViolation { .. }
        ));
        assert!(classify(Some("5"), "database is locked").is_transient());
    }

    #[test]
    fn test_classify_falls_back_to_message() {
        assert!(classify(None, "UNIQUE constraint failed: coupons.code").is_unique_violation_on("coupons.code"));
        assert!(matches!(classify(Some("1"), "near \"SELEC\": syntax error"), DbError::QueryFailed(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(DbError::PoolExhausted.is_transient());
        assert!(!DbError::CouponExhausted { coupon_id: "c".into() }.is_transient());
        assert!(!DbError::not_found("Order", "o-1").is_transient());
        assert_eq!(
            DbError::duplicate("coupons.code", "SAVE10").to_string(),
            "Duplicate value for coupons.code: 'SAVE10'"
        );
    }
}
