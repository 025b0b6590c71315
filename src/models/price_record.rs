use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::models::generate_id;

/// One successful observation of an item's price. Never updated once written;
/// the newest record per item is the baseline for the next comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub id: String,
    pub item_url: String,
    pub price: Decimal,
    pub mileage: Option<u32>,
    pub description: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl PriceRecord {
    pub fn new(item_url: String, price: Decimal, mileage: Option<u32>, description: Option<String>) -> Self {
        Self::observed_at(item_url, price, mileage, description, Utc::now())
    }

    pub fn observed_at(
        item_url: String,
        price: Decimal,
        mileage: Option<u32>,
        description: Option<String>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            item_url,
            price,
            mileage,
            description,
            checked_at,
        }
    }
}
