use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::change_detector::{AlertDecision, ChangeDetector};
use crate::config::ConfigSnapshot;
use crate::failure_tracker::FailureTracker;
use crate::fetcher::HttpTransport;
use crate::models::{
    AlertEvent, ErrorKind, FailureStreakAlert, ItemRef, PriceChangeAlert, PriceRecord, TrackedItem,
};
use crate::plugins::traits::Notifier;
use crate::scraper::{ScrapeResult, Scraper};
use crate::store::HistoryStore;
use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Baseline {
        price: Decimal,
    },
    Unchanged {
        price: Decimal,
    },
    PriceChanged {
        previous: Decimal,
        price: Decimal,
        alerted: bool,
    },
    Failed {
        error_kind: ErrorKind,
        message: String,
        consecutive_failures: u32,
        escalated: bool,
    },
    /// The history store could not be read, so the item was not evaluated.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemReport {
    pub item_url: String,
    pub name: String,
    pub attempts: u32,
    pub outcome: ItemOutcome,
    /// Store and notifier errors hit while handling this item.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub config_version: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemReport>,
}

impl PassReport {
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|i| {
                matches!(
                    i.outcome,
                    ItemOutcome::Baseline { .. } | ItemOutcome::Unchanged { .. } | ItemOutcome::PriceChanged { .. }
                )
            })
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Failed { .. }))
            .count()
    }

    pub fn alerts_sent(&self) -> usize {
        self.items
            .iter()
            .filter(|i| {
                matches!(
                    i.outcome,
                    ItemOutcome::PriceChanged { alerted: true, .. } | ItemOutcome::Failed { escalated: true, .. }
                )
            })
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().map(|i| i.errors.len()).sum()
    }
}

/// Runs monitoring passes: scrape every enabled item in order, record the
/// result and hand any resulting alerts to the notifier.
pub struct Monitor {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn HistoryStore>,
    notifier: Arc<dyn Notifier>,
    detector: ChangeDetector,
    failures: FailureTracker,
}

impl Monitor {
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn HistoryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            transport,
            failures: FailureTracker::new(Arc::clone(&store)),
            store,
            notifier,
            detector: ChangeDetector::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub async fn run_pass(&self, snapshot: &ConfigSnapshot) -> Result<PassReport> {
        let config = &snapshot.config;
        let scraper = Scraper::from_config(Arc::clone(&self.transport), &config.scraper)?;

        let started_at = Utc::now();
        let start = Instant::now();
        let enabled: Vec<&TrackedItem> = config.enabled_items().collect();
        info!(
            "Starting monitoring pass over {} item(s) (config version {})",
            enabled.len(),
            snapshot.version
        );

        let mut reports = Vec::with_capacity(enabled.len());
        for item in enabled {
            let recipients = item.recipients_or(&config.notifications.recipients);
            reports.push(self.check_item(&scraper, item, recipients).await);
        }

        let report = PassReport {
            config_version: snapshot.version,
            started_at,
            finished_at: Utc::now(),
            items: reports,
        };

        metrics::counter!("price_sentinel_passes_total").increment(1);
        info!(
            "Pass finished in {}ms: {} ok, {} failed, {} alert(s), {} error(s)",
            start.elapsed().as_millis(),
            report.succeeded(),
            report.failed(),
            report.alerts_sent(),
            report.error_count()
        );

        Ok(report)
    }

    pub async fn check_item(&self, scraper: &Scraper, item: &TrackedItem, recipients: &[String]) -> ItemReport {
        info!("Checking {} ({})", item.name, item.url);
        let result = scraper.fetch_listing(&item.url).await;

        let mut report = ItemReport {
            item_url: item.url.clone(),
            name: item.name.clone(),
            attempts: result.attempts,
            outcome: ItemOutcome::Skipped,
            errors: Vec::new(),
        };

        report.outcome = match (result.success, result.price) {
            (true, Some(price)) => self.handle_success(item, &result, price, recipients, &mut report.errors).await,
            _ => self.handle_failure(item, &result, recipients, &mut report.errors).await,
        };

        report
    }

    async fn handle_success(
        &self,
        item: &TrackedItem,
        result: &ScrapeResult,
        price: Decimal,
        recipients: &[String],
        errors: &mut Vec<String>,
    ) -> ItemOutcome {
        let previous = match self.store.latest_price(&item.url).await {
            Ok(record) => record.map(|r| r.price),
            Err(e) => {
                error!("Could not read price history for {}: {}", item.url, e);
                errors.push(e.to_string());
                return ItemOutcome::Skipped;
            }
        };

        let outcome = match self.detector.evaluate(item, previous, price) {
            AlertDecision::Baseline => {
                info!("Baseline price for {}: {}", item.name, price);
                ItemOutcome::Baseline { price }
            }
            AlertDecision::NoChange => ItemOutcome::Unchanged { price },
            AlertDecision::BelowThreshold(_) => {
                info!("{} changed to {} but is below the alert threshold", item.name, price);
                ItemOutcome::PriceChanged {
                    previous: previous.unwrap_or(price),
                    price,
                    alerted: false,
                }
            }
            AlertDecision::Alert(change) => {
                let previous_price = previous.unwrap_or(price);
                info!("Price change for {}: {} -> {}", item.name, previous_price, price);

                let event = AlertEvent::PriceChange(PriceChangeAlert {
                    item: ItemRef::from(item),
                    previous_price,
                    new_price: price,
                    change,
                    mileage: result.mileage,
                    description: result.description.clone(),
                });
                let alerted = self.deliver(&event, recipients, errors).await;

                ItemOutcome::PriceChanged {
                    previous: previous_price,
                    price,
                    alerted,
                }
            }
        };

        let record = PriceRecord::new(item.url.clone(), price, result.mileage, result.description.clone());
        if let Err(e) = self.store.append_price(&record).await {
            error!("Could not record price for {}: {}", item.url, e);
            errors.push(e.to_string());
        }

        if let Err(e) = self.failures.clear_on_success(&item.url).await {
            error!("Could not clear failures for {}: {}", item.url, e);
            errors.push(e.to_string());
        }

        outcome
    }

    async fn handle_failure(
        &self,
        item: &TrackedItem,
        result: &ScrapeResult,
        recipients: &[String],
        errors: &mut Vec<String>,
    ) -> ItemOutcome {
        let kind = result.error_kind.unwrap_or(ErrorKind::Unknown);
        let message = result.error.clone().unwrap_or_else(|| kind.to_string());
        warn!("Failed to check {}: {} ({})", item.name, message, kind);

        if let Err(e) = self
            .failures
            .record_failure(&item.url, kind, &message, result.html_snapshot.clone())
            .await
        {
            error!("Could not record failure for {}: {}", item.url, e);
            errors.push(e.to_string());
            return ItemOutcome::Failed {
                error_kind: kind,
                message,
                consecutive_failures: 0,
                escalated: false,
            };
        }

        let consecutive_failures = match self.failures.consecutive_failures(&item.url).await {
            Ok(count) => count,
            Err(e) => {
                error!("Could not count failures for {}: {}", item.url, e);
                errors.push(e.to_string());
                0
            }
        };

        let escalated = if self.failures.should_escalate(consecutive_failures) {
            warn!("{} has failed {} times in a row", item.name, consecutive_failures);
            let event = AlertEvent::FailureStreak(FailureStreakAlert {
                item: ItemRef::from(item),
                error_kind: kind,
                message: message.clone(),
                consecutive_failures,
            });
            self.deliver(&event, recipients, errors).await
        } else {
            false
        };

        ItemOutcome::Failed {
            error_kind: kind,
            message,
            consecutive_failures,
            escalated,
        }
    }

    /// Hand an event to the notifier once. Failures are logged, never retried.
    async fn deliver(&self, event: &AlertEvent, recipients: &[String], errors: &mut Vec<String>) -> bool {
        let kind = event_kind(event);
        metrics::counter!("price_sentinel_alerts_total", "type" => kind).increment(1);

        match self.notifier.notify(event, recipients).await {
            Ok(result) if result.success => true,
            Ok(result) => {
                let reason = result.error.unwrap_or_else(|| "unknown".to_string());
                error!("{} notifier rejected {} alert: {}", self.notifier.name(), kind, reason);
                metrics::counter!("price_sentinel_notification_failures_total").increment(1);
                errors.push(reason);
                false
            }
            Err(e) => {
                error!("{} notifier failed for {} alert: {}", self.notifier.name(), kind, e);
                metrics::counter!("price_sentinel_notification_failures_total").increment(1);
                errors.push(e.to_string());
                false
            }
        }
    }
}

fn event_kind(event: &AlertEvent) -> &'static str {
    match event {
        AlertEvent::PriceChange(_) => "price_change",
        AlertEvent::FailureStreak(_) => "failure_streak",
        AlertEvent::FailureDigest(_) => "failure_digest",
        AlertEvent::WeeklySummary(_) => "weekly_summary",
    }
}
