//! Expires payment intents whose buyer never came back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use settle_db::Database;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::CheckoutResult;

/// `PENDING → EXPIRED` for intents past `expires_at`.
///
/// Intents hold no stock, so expiry releases nothing; it only stops late
/// proofs from committing.
pub struct IntentSweeper {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl IntentSweeper {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        IntentSweeper { db, clock }
    }

    pub async fn sweep(&self) -> CheckoutResult<u64> {
        self.sweep_expired(self.clock.now()).await
    }

    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> CheckoutResult<u64> {
        let expired = self.db.intents().expire_stale(now).await?;
        if expired > 0 {
            info!(expired, "Expired stale payment intents");
        } else {
            debug!("No stale payment intents");
        }
        Ok(expired)
    }
}
