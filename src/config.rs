use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use crate::models::TrackedItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    pub schedule: ScheduleConfig,
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub failure_alerts: FailureAlertsConfig,
    #[serde(default)]
    pub weekly_summary: WeeklySummaryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub items: Vec<TrackedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub jitter_max_ms: u64,
    pub request_timeout_ms: u64,
    pub currency_symbol: String,
    pub user_agents: Vec<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 2000,
            jitter_max_ms: 1000,
            request_timeout_ms: 20_000,
            currency_symbol: "£".to_string(),
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily check times, "HH:MM", in `timezone`.
    pub times: Vec<String>,
    /// IANA zone name used for every scheduled job, e.g. "Europe/London".
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl ScheduleConfig {
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.trim().parse::<Tz>().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_name: String,
    #[serde(default)]
    pub tls: SmtpTls,
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (port 587).
    #[default]
    Starttls,
    /// TLS from the first byte (port 465).
    Wrapper,
    /// Unencrypted, for local relays only.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureAlertsConfig {
    pub daily_summary: bool,
    pub daily_summary_time: String,
    pub persistent_window_days: u32,
}

impl Default for FailureAlertsConfig {
    fn default() -> Self {
        Self {
            daily_summary: false,
            daily_summary_time: "18:00".to_string(),
            persistent_window_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklySummaryConfig {
    pub enabled: bool,
    pub day_of_week: String,
    pub time: String,
    pub recipients: Option<Vec<String>>,
}

impl Default for WeeklySummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            day_of_week: "sunday".to_string(),
            time: "09:00".to_string(),
            recipients: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "PRICE_SENTINEL__"
            .add_source(Environment::with_prefix("PRICE_SENTINEL").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a single explicit file, still honouring environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("PRICE_SENTINEL").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(source).map_err(|e| ConfigError::Message(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate database configuration
        if self.database.url.is_empty() {
            return Err(ConfigError::Message("Database url must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        // Validate scraper configuration
        if self.scraper.max_attempts == 0 {
            return Err(ConfigError::Message("Scraper max_attempts must be greater than 0".into()));
        }

        if self.scraper.backoff_base_ms == 0 {
            return Err(ConfigError::Message("Scraper backoff_base_ms must be greater than 0".into()));
        }

        if self.scraper.jitter_max_ms >= self.scraper.backoff_base_ms {
            return Err(ConfigError::Message("Scraper jitter_max_ms must be less than backoff_base_ms".into()));
        }

        if self.scraper.request_timeout_ms == 0 {
            return Err(ConfigError::Message("Scraper request_timeout_ms must be greater than 0".into()));
        }

        if self.scraper.user_agents.is_empty() {
            return Err(ConfigError::Message("Scraper user_agents must not be empty".into()));
        }

        if self.scraper.currency_symbol.trim().is_empty() {
            return Err(ConfigError::Message("Scraper currency_symbol must not be empty".into()));
        }

        // Validate schedule configuration
        if self.schedule.tz().is_none() {
            return Err(ConfigError::Message(format!(
                "Invalid schedule timezone '{}'",
                self.schedule.timezone
            )));
        }

        for time in &self.schedule.times {
            if parse_daily_time(time).is_none() {
                return Err(ConfigError::Message(format!("Invalid schedule time '{}', expected HH:MM", time)));
            }
        }

        // Validate notification configuration
        if !is_plausible_email(&self.notifications.sender) {
            return Err(ConfigError::Message("Notification sender must be an email address".into()));
        }

        if let Some(bad) = self.notifications.recipients.iter().find(|r| !is_plausible_email(r)) {
            return Err(ConfigError::Message(format!("Invalid recipient address '{}'", bad)));
        }

        if let Some(smtp) = &self.notifications.smtp {
            if smtp.port == 0 {
                return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
            }
        }

        // Validate failure alert configuration
        if self.failure_alerts.daily_summary && parse_daily_time(&self.failure_alerts.daily_summary_time).is_none() {
            return Err(ConfigError::Message("Invalid failure_alerts.daily_summary_time, expected HH:MM".into()));
        }

        if self.failure_alerts.persistent_window_days == 0 {
            return Err(ConfigError::Message("failure_alerts.persistent_window_days must be greater than 0".into()));
        }

        // Validate weekly summary configuration
        if self.weekly_summary.enabled {
            if parse_weekday(&self.weekly_summary.day_of_week).is_none() {
                return Err(ConfigError::Message("Invalid weekly_summary.day_of_week".into()));
            }
            if parse_daily_time(&self.weekly_summary.time).is_none() {
                return Err(ConfigError::Message("Invalid weekly_summary.time, expected HH:MM".into()));
            }
        }

        // Validate metrics configuration
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        self.validate_items()
    }

    fn validate_items(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for item in &self.items {
            match Url::parse(&item.url) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                _ => {
                    return Err(ConfigError::Message(format!("Invalid item URL '{}'", item.url)));
                }
            }

            if !seen.insert(item.url.as_str()) {
                return Err(ConfigError::Message(format!("Duplicate item URL '{}'", item.url)));
            }

            if item.name.trim().is_empty() {
                return Err(ConfigError::Message(format!("Item '{}' must have a name", item.url)));
            }

            if let Some(thresholds) = &item.thresholds {
                if thresholds.min_amount().is_sign_negative() || thresholds.min_percent().is_sign_negative() {
                    return Err(ConfigError::Message(format!("Thresholds for '{}' cannot be negative", item.name)));
                }
            }

            if let Some(bad) = item.recipients.iter().flatten().find(|r| !is_plausible_email(r)) {
                return Err(ConfigError::Message(format!("Invalid recipient address '{}' for '{}'", bad, item.name)));
            }
        }

        Ok(())
    }

    pub fn enabled_items(&self) -> impl Iterator<Item = &TrackedItem> {
        self.items.iter().filter(|item| item.enabled)
    }

    pub fn find_item(&self, url: &str) -> Option<&TrackedItem> {
        self.items.iter().find(|item| item.url == url)
    }
}

/// Parse "HH:MM" into (hour, minute).
pub fn parse_daily_time(value: &str) -> Option<(u32, u32)> {
    let (hour, minute) = value.trim().split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if hour < 24 && minute < 60 {
        Some((hour, minute))
    } else {
        None
    }
}

pub fn parse_weekday(value: &str) -> Option<Weekday> {
    value.trim().parse::<Weekday>().ok()
}

fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// An immutable view of the configuration handed to one monitoring pass.
#[derive(Debug)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub config: AppConfig,
}

/// Holds the current snapshot. Reloading swaps in a new `Arc`; passes that
/// already hold the previous one keep a consistent view until they finish.
pub struct ConfigHandle {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigHandle {
    pub fn new(config: AppConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(ConfigSnapshot {
                version: 1,
                loaded_at: Utc::now(),
                config,
            })),
        }
    }

    pub async fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Validate and publish a new configuration, returning its version.
    pub async fn reload(&self, config: AppConfig) -> Result<u64, ConfigError> {
        config.validate()?;

        let mut current = self.current.write().await;
        let version = current.version + 1;
        *current = Arc::new(ConfigSnapshot {
            version,
            loaded_at: Utc::now(),
            config,
        });

        tracing::info!("Configuration reloaded (version {})", version);
        Ok(version)
    }
}
