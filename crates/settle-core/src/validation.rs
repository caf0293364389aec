//! # Validation Module
//!
//! Input validation for checkout requests.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: THIS MODULE (shape of the request)                            │
//! │  ├── line count, quantities, blank ids                                  │
//! │  └── buyer name / email / address                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Quote assembly (catalog facts)                                │
//! │  ├── product exists and is ACTIVE                                       │
//! │  └── stock ≥ requested, coupon valid                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK (stock >= 0), CHECK (used_count <= usage_limit)              │
//! │  └── UNIQUE (gateway_ref), UNIQUE (order_number)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use settle_core::validation::{normalize_coupon_code, validate_quantity};
//!
//! validate_quantity(5).unwrap();
//! assert_eq!(normalize_coupon_code("  spring10 ").as_deref(), Some("SPRING10"));
//! ```

use crate::error::ValidationError;
use crate::types::{BuyerInfo, QuoteRequest};
use crate::{MAX_ITEM_QUANTITY, MAX_QUOTE_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a refund amount against the order total.
pub fn validate_refund_amount(amount_cents: i64, order_total_cents: i64) -> ValidationResult<()> {
    if amount_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "refund amount".to_string(),
        });
    }

    if amount_cents > order_total_cents {
        return Err(ValidationError::OutOfRange {
            field: "refund amount".to_string(),
            min: 1,
            max: order_total_cents,
        });
    }

    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates the shape of a quote request.
///
/// An empty line list is NOT rejected here: it is a business error
/// (`CoreError::NoItems`) raised by quote assembly.
pub fn validate_quote_request(request: &QuoteRequest) -> ValidationResult<()> {
    if request.lines.len() > MAX_QUOTE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_QUOTE_LINES as i64,
        });
    }

    for line in &request.lines {
        require("product_id", &line.product_id)?;
        if let Some(variant_id) = &line.variant_id {
            require("variant_id", variant_id)?;
        }
        validate_quantity(line.quantity)?;
    }

    Ok(())
}

/// Validates buyer details before a payment is initiated.
///
/// ## Rules
/// - name and shipping address are required (max 200 / 500 characters)
/// - email must look like `local@domain.tld`
pub fn validate_buyer(buyer: &BuyerInfo) -> ValidationResult<()> {
    require("name", &buyer.name)?;
    max_len("name", &buyer.name, 200)?;
    require("shipping_address", &buyer.shipping_address)?;
    max_len("shipping_address", &buyer.shipping_address, 500)?;
    validate_email(&buyer.email)
}

/// A deliberately loose address check: one `@`, a non-empty local part,
/// a dotted domain, no whitespace.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();
    require("email", email)?;
    max_len("email", email, 254)?;

    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: reason.to_string(),
    };

    if email.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| invalid("missing @"))?;

    if local.is_empty() || domain.contains('@') {
        return Err(invalid("must be of the form name@domain"));
    }

    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err(invalid("domain must contain a dot")),
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Trims and upper-cases a coupon code. Blank codes mean "no coupon".
pub fn normalize_coupon_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_uppercase())
    }
}

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LineRequest, TenderTier};

    fn buyer(email: &str) -> BuyerInfo {
        BuyerInfo {
            name: "Ayesha".to_string(),
            email: email.to_string(),
            phone: None,
            shipping_address: "12 Canal Road".to_string(),
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_quote_request() {
        let line = |product: &str, qty| LineRequest {
            product_id: product.to_string(),
            variant_id: None,
            quantity: qty,
        };
        let request = |lines| QuoteRequest {
            lines,
            coupon_code: None,
            tier: TenderTier::Retail,
        };

        assert!(validate_quote_request(&request(vec![line("p-1", 2)])).is_ok());
        assert!(validate_quote_request(&request(vec![])).is_ok());
        assert!(validate_quote_request(&request(vec![line(" ", 2)])).is_err());
        assert!(validate_quote_request(&request(vec![line("p-1", 0)])).is_err());

        let too_many = (0..=MAX_QUOTE_LINES).map(|_| line("p-1", 1)).collect();
        assert!(validate_quote_request(&request(too_many)).is_err());
    }

    #[test]
    fn test_validate_buyer() {
        assert!(validate_buyer(&buyer("ayesha@example.com")).is_ok());
        assert!(validate_buyer(&buyer("")).is_err());
        assert!(validate_buyer(&buyer("ayesha")).is_err());
        assert!(validate_buyer(&buyer("@example.com")).is_err());
        assert!(validate_buyer(&buyer("ayesha@localhost")).is_err());
        assert!(validate_buyer(&buyer("a b@example.com")).is_err());

        let mut nameless = buyer("ayesha@example.com");
        nameless.name = "  ".to_string();
        assert!(matches!(
            validate_buyer(&nameless),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_validate_refund_amount() {
        assert!(validate_refund_amount(500, 500).is_ok());
        assert!(validate_refund_amount(0, 500).is_err());
        assert!(validate_refund_amount(501, 500).is_err());
    }

    #[test]
    fn test_normalize_coupon_code() {
        assert_eq!(normalize_coupon_code(" save10 ").as_deref(), Some("SAVE10"));
        assert_eq!(normalize_coupon_code("   "), None);
    }
}
