//! Connection settings for each provider.
//!
//! Both structs deserialize straight from the `[hosted_checkout]` and
//! `[redirect]` sections of the checkout config file.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

fn default_currency() -> String {
    "INR".to_string()
}
fn default_timeout() -> u64 {
    15
}
fn default_salt_index() -> u32 {
    1
}
fn default_poll_initial_backoff() -> u64 {
    500
}
fn default_poll_max_backoff() -> u64 {
    8
}
fn default_poll_max_elapsed() -> u64 {
    60
}

fn require(field: &str, value: &str) -> GatewayResult<()> {
    if value.trim().is_empty() {
        return Err(GatewayError::InvalidConfig(format!("{field} is required")));
    }
    Ok(())
}

fn require_url(field: &str, value: &str) -> GatewayResult<()> {
    require(field, value)?;
    if !value.starts_with("https://") && !value.starts_with("http://") {
        return Err(GatewayError::InvalidConfig(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

// =============================================================================
// Hosted Checkout
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
pub struct HostedCheckoutConfig {
    pub base_url: String,
    /// Public key id, also handed to the buyer's client.
    pub key_id: String,
    /// Basic-auth password and HMAC key.
    pub key_secret: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl HostedCheckoutConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        require_url("hosted_checkout.base_url", &self.base_url)?;
        require("hosted_checkout.key_id", &self.key_id)?;
        require("hosted_checkout.key_secret", &self.key_secret)?;
        require("hosted_checkout.currency", &self.currency)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for HostedCheckoutConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedCheckoutConfig")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("currency", &self.currency)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// =============================================================================
// Redirect
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
pub struct RedirectConfig {
    pub base_url: String,
    pub merchant_id: String,
    pub salt_key: String,
    #[serde(default = "default_salt_index")]
    pub salt_index: u32,
    /// Where the provider sends the buyer back to.
    pub redirect_url: String,
    /// Server-to-server callback endpoint, if one is exposed.
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Status poll backoff: first delay in milliseconds.
    #[serde(default = "default_poll_initial_backoff")]
    pub poll_initial_backoff_ms: u64,
    /// Status poll backoff: delay ceiling in seconds.
    #[serde(default = "default_poll_max_backoff")]
    pub poll_max_backoff_secs: u64,
    /// Status poll backoff: give up after this many seconds.
    #[serde(default = "default_poll_max_elapsed")]
    pub poll_max_elapsed_secs: u64,
}

impl RedirectConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        require_url("redirect.base_url", &self.base_url)?;
        require("redirect.merchant_id", &self.merchant_id)?;
        require("redirect.salt_key", &self.salt_key)?;
        require_url("redirect.redirect_url", &self.redirect_url)?;
        if let Some(callback) = &self.callback_url {
            require_url("redirect.callback_url", callback)?;
        }
        if self.poll_max_elapsed_secs == 0 {
            return Err(GatewayError::InvalidConfig(
                "redirect.poll_max_elapsed_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for RedirectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectConfig")
            .field("base_url", &self.base_url)
            .field("merchant_id", &self.merchant_id)
            .field("salt_key", &"<redacted>")
            .field("salt_index", &self.salt_index)
            .field("redirect_url", &self.redirect_url)
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}
