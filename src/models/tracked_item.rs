use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A listing URL monitored for price changes. The URL is the identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedItem {
    pub url: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub recipients: Option<Vec<String>>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
}

/// Drop-alert dampening. Either condition alone justifies an alert; an unset
/// value counts as zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    #[serde(default)]
    pub min_amount: Option<Decimal>,
    #[serde(default)]
    pub min_percent: Option<Decimal>,
}

fn default_category() -> String {
    "General".to_string()
}

fn default_enabled() -> bool {
    true
}

impl TrackedItem {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            category: default_category(),
            enabled: true,
            recipients: None,
            thresholds: None,
        }
    }

    pub fn with_thresholds(mut self, min_amount: Option<Decimal>, min_percent: Option<Decimal>) -> Self {
        self.thresholds = Some(Thresholds { min_amount, min_percent });
        self
    }

    pub fn with_recipients(mut self, recipients: Vec<String>) -> Self {
        self.recipients = Some(recipients);
        self
    }

    /// Item-specific recipients, or the global list when none are configured.
    pub fn recipients_or<'a>(&'a self, global: &'a [String]) -> &'a [String] {
        match &self.recipients {
            Some(list) if !list.is_empty() => list,
            _ => global,
        }
    }
}

impl Thresholds {
    pub fn min_amount(&self) -> Decimal {
        self.min_amount.unwrap_or(Decimal::ZERO)
    }

    pub fn min_percent(&self) -> Decimal {
        self.min_percent.unwrap_or(Decimal::ZERO)
    }
}
