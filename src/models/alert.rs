use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::models::{ChangeType, ErrorKind, FailureRecord, PersistentFailure, TrackedItem};

/// Events handed to a notifier. They carry values only; wording and layout
/// belong to the notifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertEvent {
    PriceChange(PriceChangeAlert),
    FailureStreak(FailureStreakAlert),
    FailureDigest(FailureDigest),
    WeeklySummary(WeeklySummary),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemRef {
    pub url: String,
    pub name: String,
    pub category: String,
}

impl From<&TrackedItem> for ItemRef {
    fn from(item: &TrackedItem) -> Self {
        Self {
            url: item.url.clone(),
            name: item.name.clone(),
            category: item.category.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceChange {
    pub change_type: ChangeType,
    /// `new - previous`; negative for drops.
    pub difference: Decimal,
    /// Absent when the previous price was zero.
    pub percent_change: Option<Decimal>,
}

impl PriceChange {
    pub fn between(previous: Decimal, new: Decimal) -> Self {
        let difference = new - previous;
        let change_type = if difference > Decimal::ZERO {
            ChangeType::Increased
        } else if difference < Decimal::ZERO {
            ChangeType::Decreased
        } else {
            ChangeType::Unchanged
        };
        let percent_change = difference
            .checked_div(previous)
            .map(|ratio| ratio * Decimal::ONE_HUNDRED);

        Self {
            change_type,
            difference,
            percent_change,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceChangeAlert {
    pub item: ItemRef,
    pub previous_price: Decimal,
    pub new_price: Decimal,
    pub change: PriceChange,
    pub mileage: Option<u32>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureStreakAlert {
    pub item: ItemRef,
    pub error_kind: ErrorKind,
    pub message: String,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureDigest {
    pub since: DateTime<Utc>,
    pub items: Vec<ItemFailures>,
}

impl FailureDigest {
    pub fn total_failures(&self) -> usize {
        self.items.iter().map(|i| i.failures.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemFailures {
    pub item_url: String,
    /// Display name when the item is still configured.
    pub item_name: Option<String>,
    /// Newest first.
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemTrend {
    pub item: ItemRef,
    pub current_price: Decimal,
    pub week_start_price: Decimal,
    pub difference: Decimal,
    pub price_changes: usize,
    pub checks_this_week: usize,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklySummary {
    pub generated_at: DateTime<Utc>,
    pub items: Vec<ItemTrend>,
    pub persistent_failures: Vec<PersistentFailure>,
}

impl WeeklySummary {
    /// Sum of all week-over-week drops.
    pub fn total_savings(&self) -> Decimal {
        self.items
            .iter()
            .filter(|t| t.difference < Decimal::ZERO)
            .map(|t| t.difference.abs())
            .sum()
    }

    pub fn changed_items(&self) -> usize {
        self.items.iter().filter(|t| t.difference != Decimal::ZERO).count()
    }

    pub fn biggest_drop(&self) -> Option<&ItemTrend> {
        self.items
            .iter()
            .filter(|t| t.difference < Decimal::ZERO)
            .min_by(|a, b| a.difference.cmp(&b.difference))
    }

    pub fn biggest_increase(&self) -> Option<&ItemTrend> {
        self.items
            .iter()
            .filter(|t| t.difference > Decimal::ZERO)
            .max_by(|a, b| a.difference.cmp(&b.difference))
    }
}
