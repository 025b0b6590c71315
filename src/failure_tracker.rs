use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::models::{ErrorKind, FailureRecord, PersistentFailure};
use crate::store::HistoryStore;
use crate::utils::error::Result;

/// Streak length at which a failure alert goes out. Fires once per streak.
pub const FAILURE_ALERT_STREAK: u32 = 3;

pub struct FailureTracker {
    store: Arc<dyn HistoryStore>,
}

impl FailureTracker {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub async fn record_failure(
        &self,
        item_url: &str,
        kind: ErrorKind,
        message: &str,
        html_snapshot: Option<String>,
    ) -> Result<FailureRecord> {
        let record = FailureRecord::new(item_url.to_string(), kind, message.to_string(), html_snapshot);
        self.store.record_failure(&record).await?;
        Ok(record)
    }

    pub async fn consecutive_failures(&self, item_url: &str) -> Result<u32> {
        self.store.consecutive_failures(item_url).await
    }

    pub async fn clear_on_success(&self, item_url: &str) -> Result<()> {
        let cleared = self.store.clear_failures(item_url).await?;
        if cleared > 0 {
            debug!("Cleared {} outstanding failure(s) for {}", cleared, item_url);
        }
        Ok(())
    }

    /// Items failing without a successful scrape for more than `window_days`.
    pub async fn persistent_failures(&self, window_days: u32, now: DateTime<Utc>) -> Result<Vec<PersistentFailure>> {
        let cutoff = now - Duration::days(i64::from(window_days));
        self.store.persistent_failures(cutoff).await
    }

    /// Edge-triggered: true only when the streak has just reached the threshold.
    pub fn should_escalate(&self, consecutive_failures: u32) -> bool {
        consecutive_failures == FAILURE_ALERT_STREAK
    }
}
