use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::models::{ErrorKind, FailureRecord, PersistentFailure, PriceRecord};
use crate::store::HistoryStore;
use crate::utils::error::{AppError, Result};

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to an in-memory database sees its own empty database
        let max_connections = if url.contains(":memory:") { 1 } else { max_connections };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| AppError::Parse {
            message: format!("Invalid timestamp '{}': {}", value, e),
        })
}

fn price_record_from_row(row: &SqliteRow) -> Result<PriceRecord> {
    let price: String = row.try_get("price")?;
    let mileage: Option<i64> = row.try_get("mileage")?;
    let checked_at: String = row.try_get("checked_at")?;

    Ok(PriceRecord {
        id: row.try_get("id")?,
        item_url: row.try_get("item_url")?,
        price: Decimal::from_str(&price).map_err(|e| AppError::Parse {
            message: format!("Invalid stored price '{}': {}", price, e),
        })?,
        mileage: mileage.and_then(|m| u32::try_from(m).ok()),
        description: row.try_get("description")?,
        checked_at: decode_timestamp(&checked_at)?,
    })
}

fn failure_record_from_row(row: &SqliteRow) -> Result<FailureRecord> {
    let error_kind: String = row.try_get("error_kind")?;
    let failed_at: String = row.try_get("failed_at")?;

    Ok(FailureRecord {
        id: row.try_get("id")?,
        item_url: row.try_get("item_url")?,
        error_kind: ErrorKind::parse(&error_kind),
        message: row.try_get("message")?,
        failed_at: decode_timestamp(&failed_at)?,
        html_snapshot: row.try_get("html_snapshot")?,
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn latest_price(&self, item_url: &str) -> Result<Option<PriceRecord>> {
        let row = sqlx::query(
            "SELECT id, item_url, price, mileage, description, checked_at
             FROM price_records WHERE item_url = ?
             ORDER BY checked_at DESC, rowid DESC LIMIT 1",
        )
        .bind(item_url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(price_record_from_row).transpose()
    }

    async fn append_price(&self, record: &PriceRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO price_records (id, item_url, price, mileage, description, checked_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.item_url)
        .bind(record.price.to_string())
        .bind(record.mileage.map(i64::from))
        .bind(&record.description)
        .bind(encode_timestamp(&record.checked_at))
        .execute(&self.pool)
        .await?;

        debug!("Recorded price {} for {}", record.price, record.item_url);
        Ok(())
    }

    async fn record_failure(&self, record: &FailureRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO failure_records (id, item_url, error_kind, message, failed_at, html_snapshot)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.item_url)
        .bind(record.error_kind.as_str())
        .bind(&record.message)
        .bind(encode_timestamp(&record.failed_at))
        .bind(&record.html_snapshot)
        .execute(&self.pool)
        .await?;

        debug!("Recorded {} failure for {}", record.error_kind, record.item_url);
        Ok(())
    }

    async fn consecutive_failures(&self, item_url: &str) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM failure_records
             WHERE item_url = ?
               AND failed_at > COALESCE(
                   (SELECT MAX(checked_at) FROM price_records WHERE item_url = ?), '')",
        )
        .bind(item_url)
        .bind(item_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn clear_failures(&self, item_url: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM failure_records WHERE item_url = ?")
            .bind(item_url)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn failures_since(&self, since: DateTime<Utc>) -> Result<Vec<FailureRecord>> {
        let rows = sqlx::query(
            "SELECT id, item_url, error_kind, message, failed_at, html_snapshot
             FROM failure_records WHERE failed_at >= ?
             ORDER BY failed_at DESC",
        )
        .bind(encode_timestamp(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(failure_record_from_row).collect()
    }

    async fn persistent_failures(&self, cutoff: DateTime<Utc>) -> Result<Vec<PersistentFailure>> {
        let rows = sqlx::query(
            "SELECT f.item_url AS item_url,
                    MIN(f.failed_at) AS first_failure,
                    COUNT(*) AS failure_count
             FROM failure_records f
             WHERE NOT EXISTS (
                 SELECT 1 FROM price_records p
                 WHERE p.item_url = f.item_url AND p.checked_at > f.failed_at
             )
             GROUP BY f.item_url
             HAVING MIN(f.failed_at) <= ?
             ORDER BY first_failure ASC",
        )
        .bind(encode_timestamp(&cutoff))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let first_failure: String = row.try_get("first_failure")?;
                let failure_count: i64 = row.try_get("failure_count")?;
                Ok(PersistentFailure {
                    item_url: row.try_get("item_url")?,
                    first_failure: decode_timestamp(&first_failure)?,
                    failure_count: u32::try_from(failure_count).unwrap_or(u32::MAX),
                })
            })
            .collect()
    }

    async fn price_history(&self, item_url: &str, limit: u32) -> Result<Vec<PriceRecord>> {
        let rows = sqlx::query(
            "SELECT id, item_url, price, mileage, description, checked_at
             FROM price_records WHERE item_url = ?
             ORDER BY checked_at DESC, rowid DESC LIMIT ?",
        )
        .bind(item_url)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(price_record_from_row).collect()
    }
}
