use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::TempDir;

use price_sentinel::models::{ErrorKind, FailureRecord, PriceRecord};
use price_sentinel::store::{HistoryStore, SqliteHistoryStore};

const URL: &str = "https://cars.example.com/mgb";

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("history.db").display())
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let url = database_url(&dir);
    let checked_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::nanoseconds(123_456_789);

    {
        let store = SqliteHistoryStore::connect(&url, 2).await.unwrap();
        store
            .append_price(&PriceRecord::observed_at(
                URL.to_string(),
                Decimal::from_str("12500.50").unwrap(),
                Some(48_000),
                Some("1972 MGB Roadster".to_string()),
                checked_at,
            ))
            .await
            .unwrap();
        store.pool().close().await;
    }

    let store = SqliteHistoryStore::connect(&url, 2).await.unwrap();
    let latest = store.latest_price(URL).await.unwrap().unwrap();

    assert_eq!(latest.price, Decimal::from_str("12500.50").unwrap());
    assert_eq!(latest.mileage, Some(48_000));
    assert_eq!(latest.description.as_deref(), Some("1972 MGB Roadster"));
    assert_eq!(latest.checked_at, checked_at);
}

#[tokio::test]
async fn test_streak_counts_only_failures_after_last_price() {
    let dir = TempDir::new().unwrap();
    let store = SqliteHistoryStore::connect(&database_url(&dir), 2).await.unwrap();
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    for hours in [0, 12] {
        store
            .record_failure(&FailureRecord::observed_at(
                URL.to_string(),
                ErrorKind::Timeout,
                "Request timed out".to_string(),
                None,
                start + Duration::hours(hours),
            ))
            .await
            .unwrap();
    }
    store
        .append_price(&PriceRecord::observed_at(URL.to_string(), Decimal::from(9_000), None, None, start + Duration::days(1)))
        .await
        .unwrap();
    store
        .record_failure(&FailureRecord::observed_at(
            URL.to_string(),
            ErrorKind::ServerError,
            "HTTP 502".to_string(),
            None,
            start + Duration::days(2),
        ))
        .await
        .unwrap();

    assert_eq!(store.consecutive_failures(URL).await.unwrap(), 1);
    assert_eq!(store.clear_failures(URL).await.unwrap(), 3);
    assert_eq!(store.consecutive_failures(URL).await.unwrap(), 0);
}

#[tokio::test]
async fn test_persistent_failures_ignore_recovered_items() {
    let dir = TempDir::new().unwrap();
    let store = SqliteHistoryStore::connect(&database_url(&dir), 2).await.unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap();
    let gone = "https://cars.example.com/gone";
    let recovered = "https://cars.example.com/recovered";

    for days in [10, 5, 1] {
        store
            .record_failure(&FailureRecord::observed_at(
                gone.to_string(),
                ErrorKind::Gone,
                "HTTP 410".to_string(),
                None,
                now - Duration::days(days),
            ))
            .await
            .unwrap();
    }
    store
        .record_failure(&FailureRecord::observed_at(
            recovered.to_string(),
            ErrorKind::Timeout,
            "Request timed out".to_string(),
            None,
            now - Duration::days(9),
        ))
        .await
        .unwrap();
    store
        .append_price(&PriceRecord::observed_at(recovered.to_string(), Decimal::from(300), None, None, now - Duration::days(8)))
        .await
        .unwrap();

    let persistent = store.persistent_failures(now - Duration::days(7)).await.unwrap();

    assert_eq!(persistent.len(), 1);
    assert_eq!(persistent[0].item_url, gone);
    assert_eq!(persistent[0].failure_count, 3);
    assert_eq!(persistent[0].first_failure, now - Duration::days(10));
}
