use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::failure_tracker::FailureTracker;
use crate::models::{FailureDigest, ItemFailures, ItemRef, ItemTrend, PriceRecord, TrackedItem, Trend, WeeklySummary};
use crate::store::HistoryStore;
use crate::utils::error::Result;

/// Price records pulled per item when building the weekly summary.
const WEEKLY_HISTORY_LIMIT: u32 = 50;
const WEEKLY_WINDOW_DAYS: u32 = 7;

pub struct Reporter {
    store: Arc<dyn HistoryStore>,
    failures: FailureTracker,
    persistent_window_days: u32,
}

impl Reporter {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            failures: FailureTracker::new(Arc::clone(&store)),
            store,
            persistent_window_days: WEEKLY_WINDOW_DAYS,
        }
    }

    pub fn with_persistent_window(mut self, days: u32) -> Self {
        self.persistent_window_days = days;
        self
    }

    /// Failures from the last `hours`, grouped by item. `None` when there
    /// is nothing to report.
    pub async fn daily_failure_summary(
        &self,
        items: &[TrackedItem],
        hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<FailureDigest>> {
        let since = now - Duration::hours(i64::from(hours));
        let failures = self.store.failures_since(since).await?;

        if failures.is_empty() {
            return Ok(None);
        }

        let mut grouped: Vec<ItemFailures> = Vec::new();
        for failure in failures {
            match grouped.iter_mut().find(|g| g.item_url == failure.item_url) {
                Some(group) => group.failures.push(failure),
                None => grouped.push(ItemFailures {
                    item_name: items
                        .iter()
                        .find(|item| item.url == failure.item_url)
                        .map(|item| item.name.clone()),
                    item_url: failure.item_url.clone(),
                    failures: vec![failure],
                }),
            }
        }

        Ok(Some(FailureDigest { since, items: grouped }))
    }

    /// Seven-day trend for every item checked during the week, plus
    /// items that have been failing for the whole persistent-failure window.
    pub async fn weekly_summary(&self, items: &[TrackedItem], now: DateTime<Utc>) -> Result<WeeklySummary> {
        let week_start = now - Duration::days(i64::from(WEEKLY_WINDOW_DAYS));

        let mut trends = Vec::new();
        for item in items {
            let history = self.store.price_history(&item.url, WEEKLY_HISTORY_LIMIT).await?;
            if let Some(trend) = item_trend(item, &history, week_start) {
                trends.push(trend);
            }
        }

        let persistent_failures = self.failures.persistent_failures(self.persistent_window_days, now).await?;

        Ok(WeeklySummary {
            generated_at: now,
            items: trends,
            persistent_failures,
        })
    }
}

/// `history` is newest first. Only records checked since `week_start` count;
/// the oldest of them is the week-start price.
fn item_trend(item: &TrackedItem, history: &[PriceRecord], week_start: DateTime<Utc>) -> Option<ItemTrend> {
    let this_week: Vec<&PriceRecord> = history.iter().filter(|r| r.checked_at >= week_start).collect();
    let (first, last) = (this_week.first()?, this_week.last()?);

    let current_price = first.price;
    let week_start_price = last.price;
    let difference = current_price - week_start_price;
    let price_changes = this_week.windows(2).filter(|pair| pair[0].price != pair[1].price).count();

    let trend = if difference < Decimal::ZERO {
        Trend::Down
    } else if difference > Decimal::ZERO {
        Trend::Up
    } else {
        Trend::Stable
    };

    Some(ItemTrend {
        item: ItemRef::from(item),
        current_price,
        week_start_price,
        difference,
        price_changes,
        checks_this_week: this_week.len(),
        trend,
    })
}
