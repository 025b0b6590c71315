use rust_decimal::Decimal;

use crate::models::{ChangeType, PriceChange, TrackedItem};

#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    /// First observation for the item; nothing to compare against.
    Baseline,
    NoChange,
    Alert(PriceChange),
    /// A drop smaller than both of the item's thresholds.
    BelowThreshold(PriceChange),
}

impl AlertDecision {
    pub fn should_alert(&self) -> bool {
        matches!(self, AlertDecision::Alert(_))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Compare a fresh price against the item's last recorded one.
    ///
    /// Increases always alert. Thresholds only dampen drops: a drop alerts
    /// when it meets `min_amount` or `min_percent` (unset values count as 0).
    pub fn evaluate(&self, item: &TrackedItem, previous: Option<Decimal>, new_price: Decimal) -> AlertDecision {
        let Some(previous) = previous else {
            return AlertDecision::Baseline;
        };

        if previous == new_price {
            return AlertDecision::NoChange;
        }

        let change = PriceChange::between(previous, new_price);

        let Some(thresholds) = &item.thresholds else {
            return AlertDecision::Alert(change);
        };

        if change.change_type == ChangeType::Increased {
            return AlertDecision::Alert(change);
        }

        let drop = change.difference.abs();
        let meets_amount = drop >= thresholds.min_amount();
        let meets_percent = match change.percent_change {
            Some(percent) => percent.abs() >= thresholds.min_percent(),
            None => true,
        };

        if meets_amount || meets_percent {
            AlertDecision::Alert(change)
        } else {
            AlertDecision::BelowThreshold(change)
        }
    }
}
