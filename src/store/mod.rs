use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{FailureRecord, PersistentFailure, PriceRecord};
use crate::utils::error::Result;

pub mod sqlite;

pub use sqlite::SqliteHistoryStore;

/// Per-item price and failure history.
///
/// Price records are append-only. Failure records accumulate until the item
/// scrapes successfully again, at which point they are cleared.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recent price record for the item, if any.
    async fn latest_price(&self, item_url: &str) -> Result<Option<PriceRecord>>;

    async fn append_price(&self, record: &PriceRecord) -> Result<()>;

    async fn record_failure(&self, record: &FailureRecord) -> Result<()>;

    /// Failures recorded strictly after the item's latest price record.
    async fn consecutive_failures(&self, item_url: &str) -> Result<u32>;

    /// Remove outstanding failures for the item, returning how many were removed.
    async fn clear_failures(&self, item_url: &str) -> Result<u64>;

    /// All failures at or after `since`, newest first.
    async fn failures_since(&self, since: DateTime<Utc>) -> Result<Vec<FailureRecord>>;

    /// Items whose earliest unresolved failure is at or before `cutoff`.
    async fn persistent_failures(&self, cutoff: DateTime<Utc>) -> Result<Vec<PersistentFailure>>;

    /// Up to `limit` price records for the item, newest first.
    async fn price_history(&self, item_url: &str, limit: u32) -> Result<Vec<PriceRecord>>;
}
