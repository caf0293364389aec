//! # Checkout Configuration
//!
//! Loads settings for the checkout services and the worker.
//!
//! ## Load Order (later overrides earlier)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Defaults                                                            │
//! │  2. settle.toml  (explicit path, or the platform config directory)      │
//! │  3. SETTLE_* environment variables                                      │
//! │  4. validate()                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Config File
//! ```toml
//! [database]
//! path = "/var/lib/settle/settle.db"
//! max_connections = 5
//!
//! [pricing]
//! shipping_cost_cents = 0
//! intent_ttl_hours = 24
//!
//! [hosted_checkout]
//! base_url = "https://api.provider.example"
//! key_id = "key_live_..."
//! key_secret = "..."
//!
//! [redirect]
//! base_url = "https://pay.provider.example"
//! merchant_id = "MERCHANT"
//! salt_key = "..."
//! salt_index = 1
//! redirect_url = "https://shop.example.com/checkout/return"
//!
//! [worker]
//! sweep_interval_secs = 60
//! dispatch_interval_secs = 5
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use settle_core::quote::QuotePolicy;
use settle_core::Money;
use settle_db::DbConfig;
use settle_gateway::{Gateways, HostedCheckoutConfig, RedirectConfig};
use tracing::{debug, info, warn};

use crate::error::{CheckoutError, CheckoutResult};

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "settle", "settle")
        .map(|dirs| dirs.data_dir().join("settle.db"))
        .unwrap_or_else(|| PathBuf::from("settle.db"))
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Flat shipping cost added to every quote.
    #[serde(default)]
    pub shipping_cost_cents: i64,
    /// How long an unpaid intent stays PENDING.
    #[serde(default = "default_intent_ttl")]
    pub intent_ttl_hours: i64,
}

fn default_intent_ttl() -> i64 {
    24
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            shipping_cost_cents: 0,
            intent_ttl_hours: default_intent_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_secs: u64,
    /// Notifications delivered per dispatch pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Attempts before a notification is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delivered notifications older than this are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_sweep_interval() -> u64 {
    60
}
fn default_dispatch_interval() -> u64 {
    5
}
fn default_batch_size() -> u32 {
    50
}
fn default_max_attempts() -> u32 {
    10
}
fn default_retention_days() -> u32 {
    30
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            sweep_interval_secs: default_sweep_interval(),
            dispatch_interval_secs: default_dispatch_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retention_days: default_retention_days(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    /// Absent: hosted checkout payments are refused.
    #[serde(default)]
    pub hosted_checkout: Option<HostedCheckoutConfig>,

    /// Absent: redirect payments are refused.
    #[serde(default)]
    pub redirect: Option<RedirectConfig>,

    #[serde(default)]
    pub worker: WorkerSettings,
}

impl CheckoutConfig {
    /// Loads configuration from file, environment, and defaults.
    pub fn load(config_path: Option<PathBuf>) -> CheckoutResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading checkout config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| CheckoutError::Config(format!("{}: {e}", path.display())))?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> CheckoutResult<Self> {
        toml::from_str(contents).map_err(|e| CheckoutError::Config(e.to_string()))
    }

    pub fn validate(&self) -> CheckoutResult<()> {
        if self.pricing.shipping_cost_cents < 0 {
            return Err(CheckoutError::Config(
                "pricing.shipping_cost_cents must not be negative".into(),
            ));
        }
        if self.pricing.intent_ttl_hours <= 0 {
            return Err(CheckoutError::Config(
                "pricing.intent_ttl_hours must be greater than 0".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(CheckoutError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.worker.batch_size == 0 {
            return Err(CheckoutError::Config("worker.batch_size must be greater than 0".into()));
        }
        if self.worker.sweep_interval_secs == 0 || self.worker.dispatch_interval_secs == 0 {
            return Err(CheckoutError::Config("worker intervals must be greater than 0".into()));
        }

        if let Some(hosted) = &self.hosted_checkout {
            hosted.validate().map_err(|e| CheckoutError::Config(e.to_string()))?;
        }
        if let Some(redirect) = &self.redirect {
            redirect.validate().map_err(|e| CheckoutError::Config(e.to_string()))?;
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `SETTLE_*` overrides from `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("SETTLE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(value) = lookup("SETTLE_SHIPPING_COST_CENTS") {
            match value.parse() {
                Ok(cents) => self.pricing.shipping_cost_cents = cents,
                Err(_) => warn!(value = %value, "Ignoring invalid SETTLE_SHIPPING_COST_CENTS"),
            }
        }

        if let Some(value) = lookup("SETTLE_INTENT_TTL_HOURS") {
            match value.parse() {
                Ok(hours) => self.pricing.intent_ttl_hours = hours,
                Err(_) => warn!(value = %value, "Ignoring invalid SETTLE_INTENT_TTL_HOURS"),
            }
        }

        // Secrets usually come from the environment rather than the file.
        if let Some(hosted) = self.hosted_checkout.as_mut() {
            if let Some(secret) = lookup("SETTLE_HOSTED_KEY_SECRET") {
                hosted.key_secret = secret;
            }
        }
        if let Some(redirect) = self.redirect.as_mut() {
            if let Some(salt) = lookup("SETTLE_REDIRECT_SALT_KEY") {
                redirect.salt_key = salt;
            }
        }

        if let Some(value) = lookup("SETTLE_WORKER_BATCH_SIZE") {
            if let Ok(size) = value.parse() {
                self.worker.batch_size = size;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "settle", "settle")
            .map(|dirs| dirs.config_dir().join("settle.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }

    pub fn quote_policy(&self) -> QuotePolicy {
        QuotePolicy {
            shipping: Money::from_cents(self.pricing.shipping_cost_cents),
        }
    }

    pub fn intent_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pricing.intent_ttl_hours)
    }

    /// Clients for every configured provider.
    pub fn gateways(&self) -> CheckoutResult<Gateways> {
        Gateways::from_config(self.hosted_checkout.as_ref(), self.redirect.as_ref())
            .map_err(|e| CheckoutError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
        [database]
        path = "/tmp/settle-test.db"

        [pricing]
        shipping_cost_cents = 250

        [hosted_checkout]
        base_url = "https://api.example.com"
        key_id = "key_test"
        key_secret = "from-file"

        [worker]
        batch_size = 20
    "#;

    #[test]
    fn test_defaults() {
        let config = CheckoutConfig::default();
        assert_eq!(config.pricing.shipping_cost_cents, 0);
        assert_eq!(config.intent_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.worker.max_attempts, 10);
        assert!(config.hosted_checkout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = CheckoutConfig::from_toml(FULL).unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/settle-test.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.quote_policy().shipping, Money::from_cents(250));
        assert_eq!(config.pricing.intent_ttl_hours, 24);
        assert_eq!(config.worker.batch_size, 20);
        assert_eq!(config.hosted_checkout.as_ref().unwrap().currency, "INR");
        assert!(config.redirect.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = CheckoutConfig::from_toml(FULL).unwrap();
        let env: HashMap<&str, &str> = [
            ("SETTLE_DB_PATH", "/data/override.db"),
            ("SETTLE_INTENT_TTL_HOURS", "2"),
            ("SETTLE_SHIPPING_COST_CENTS", "not-a-number"),
            ("SETTLE_HOSTED_KEY_SECRET", "from-env"),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/data/override.db"));
        assert_eq!(config.pricing.intent_ttl_hours, 2);
        assert_eq!(config.pricing.shipping_cost_cents, 250);
        assert_eq!(config.hosted_checkout.unwrap().key_secret, "from-env");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = CheckoutConfig::default();
        config.pricing.intent_ttl_hours = 0;
        assert!(matches!(config.validate(), Err(CheckoutError::Config(_))));

        let mut config = CheckoutConfig::default();
        config.pricing.shipping_cost_cents = -1;
        assert!(config.validate().is_err());

        let broken = r#"
            [redirect]
            base_url = "pay.example.com"
            merchant_id = "M"
            salt_key = "s"
            redirect_url = "https://shop.example.com"
        "#;
        assert!(CheckoutConfig::from_toml(broken).unwrap().validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = CheckoutConfig::load(Some(PathBuf::from("/nonexistent/settle.toml"))).unwrap();
        assert_eq!(config.worker.dispatch_interval_secs, 5);
    }

    #[test]
    fn test_gateways_from_config() {
        let gateways = CheckoutConfig::from_toml(FULL).unwrap().gateways().unwrap();
        assert!(gateways.is_configured(settle_core::Tender::HostedCheckout));
        assert!(!gateways.is_configured(settle_core::Tender::Redirect));
    }
}
