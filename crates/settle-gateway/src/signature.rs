//! # Signature Schemes
//!
//! Both provider schemes in one place, so checkout code never touches raw
//! hashes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HOSTED CHECKOUT                                                        │
//! │    signature = hex(HMAC-SHA256(order_ref + "|" + payment_ref, secret))  │
//! │                                                                         │
//! │  REDIRECT                                                               │
//! │    X-VERIFY  = hex(SHA256(body + path + salt_key)) + "###" + salt_index │
//! │      pay:      body = base64 payload, path = pay endpoint path          │
//! │      status:   body = "",             path = status endpoint path       │
//! │      callback: body = base64 response, path = ""                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Comparisons are constant-time.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{GatewayError, GatewayResult};

type HmacSha256 = Hmac<Sha256>;

const CHECKSUM_SEPARATOR: &str = "###";

// =============================================================================
// Hosted Checkout (HMAC)
// =============================================================================

fn hosted_mac(order_ref: &str, payment_ref: &str, secret: &str) -> GatewayResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::InvalidConfig(format!("HMAC key: {e}")))?;
    mac.update(order_ref.as_bytes());
    mac.update(b"|");
    mac.update(payment_ref.as_bytes());
    Ok(mac)
}

/// Hex signature the hosted checkout client returns after payment.
pub fn hosted_signature(order_ref: &str, payment_ref: &str, secret: &str) -> GatewayResult<String> {
    let mac = hosted_mac(order_ref, payment_ref, secret)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hosted checkout signature.
///
/// Malformed hex is a mismatch, not an error.
pub fn verify_hosted_signature(
    order_ref: &str,
    payment_ref: &str,
    signature_hex: &str,
    secret: &str,
) -> GatewayResult<bool> {
    let Ok(provided) = hex::decode(signature_hex.trim()) else {
        return Ok(false);
    };
    let mac = hosted_mac(order_ref, payment_ref, secret)?;
    Ok(mac.verify_slice(&provided).is_ok())
}

// =============================================================================
// Redirect (salted SHA-256)
// =============================================================================

/// `hex(SHA256(body + path + salt_key)) ### salt_index`
pub fn redirect_checksum(body: &str, path: &str, salt_key: &str, salt_index: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher.update(path.as_bytes());
    hasher.update(salt_key.as_bytes());
    format!(
        "{}{}{}",
        hex::encode(hasher.finalize()),
        CHECKSUM_SEPARATOR,
        salt_index
    )
}

/// Checks an `X-VERIFY` header the provider sent us.
pub fn verify_redirect_checksum(
    header: &str,
    body: &str,
    path: &str,
    salt_key: &str,
    salt_index: u32,
) -> bool {
    let expected = redirect_checksum(body, path, salt_key, salt_index);
    let candidate = header.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(candidate.as_bytes()).into()
}

// =============================================================================
// Unit Tests
// =============================================================================
