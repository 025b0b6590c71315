// Shared fixtures for the integration tests

pub mod config_tests;
pub mod monitor_tests;
pub mod store_tests;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use price_sentinel::config::{
    AppConfig, DatabaseConfig, FailureAlertsConfig, MetricsConfig, NotificationsConfig, ScheduleConfig,
    ScraperConfig, WeeklySummaryConfig,
};
use price_sentinel::fetcher::ReqwestTransport;
use price_sentinel::models::{AlertEvent, TrackedItem};
use price_sentinel::plugins::{NotificationResult, Notifier};
use price_sentinel::store::SqliteHistoryStore;
use price_sentinel::{ConfigSnapshot, Monitor};

/// Keeps every event it is handed. Can be told to reject them.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(AlertEvent, Vec<String>)>>,
    reject: bool,
}

impl RecordingNotifier {
    pub fn rejecting() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().unwrap().iter().map(|(event, _)| event.clone()).collect()
    }

    pub fn recipients(&self) -> Vec<Vec<String>> {
        self.events.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, event: &AlertEvent, recipients: &[String]) -> price_sentinel::Result<NotificationResult> {
        self.events.lock().unwrap().push((event.clone(), recipients.to_vec()));
        if self.reject {
            Ok(NotificationResult::failed("mailbox full"))
        } else {
            Ok(NotificationResult::delivered("recorded"))
        }
    }
}

/// Configuration with millisecond backoff so retry tests stay fast.
pub fn test_config(items: Vec<TrackedItem>) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        scraper: ScraperConfig {
            backoff_base_ms: 1,
            jitter_max_ms: 0,
            request_timeout_ms: 5_000,
            ..ScraperConfig::default()
        },
        schedule: ScheduleConfig {
            times: vec!["09:00".to_string()],
            timezone: "UTC".to_string(),
        },
        notifications: NotificationsConfig {
            sender: "monitor@example.com".to_string(),
            recipients: vec!["owner@example.com".to_string()],
            smtp: None,
        },
        failure_alerts: FailureAlertsConfig::default(),
        weekly_summary: WeeklySummaryConfig::default(),
        metrics: MetricsConfig::default(),
        items,
    }
}

pub fn snapshot(items: Vec<TrackedItem>) -> ConfigSnapshot {
    ConfigSnapshot {
        version: 1,
        loaded_at: chrono::Utc::now(),
        config: test_config(items),
    }
}

pub async fn memory_store() -> Arc<SqliteHistoryStore> {
    Arc::new(
        SqliteHistoryStore::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory store"),
    )
}

pub fn monitor(store: Arc<SqliteHistoryStore>, notifier: Arc<RecordingNotifier>) -> Monitor {
    let transport = ReqwestTransport::new().expect("reqwest client");
    Monitor::new(Arc::new(transport), store, notifier)
}

pub fn listing_page(price: &str) -> String {
    format!(
        r#"<html>
<head><title>1972 MGB Roadster</title><meta name="description" content="Tax exempt classic, recent restoration"></head>
<body>
  <h1>1972 MGB Roadster</h1>
  <div class="vehicle-price">£{}</div>
  <ul class="specs"><li>62,000 miles</li><li>Manual</li></ul>
</body>
</html>"#,
        price
    )
}
