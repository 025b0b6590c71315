use rust_decimal::Decimal;
use std::io::Write;

use price_sentinel::config::AppConfig;
use price_sentinel::ConfigHandle;

const CONFIG: &str = r#"
[database]
url = "sqlite::memory:"
max_connections = 1

[schedule]
times = ["07:30", "19:30"]
timezone = "Europe/London"

[notifications]
sender = "monitor@example.com"
recipients = ["owner@example.com"]

[weekly_summary]
enabled = true
day_of_week = "friday"
time = "17:00"

[[items]]
url = "https://cars.example.com/mgb"
name = "1972 MGB Roadster"
category = "Cars"

[items.thresholds]
min_amount = 250
min_percent = 2.5

[[items]]
url = "https://shop.example.com/lego/42115"
name = "Lamborghini Sian"
enabled = false
recipients = ["lego@example.com"]
"#;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(CONFIG);
    let config = AppConfig::from_file(file.path()).unwrap();

    assert_eq!(config.schedule.times, vec!["07:30", "19:30"]);
    assert_eq!(config.schedule.tz(), Some(chrono_tz::Europe::London));
    assert_eq!(config.scraper.max_attempts, 3);
    assert_eq!(config.scraper.currency_symbol, "£");
    assert!(config.weekly_summary.enabled);

    let mgb = config.find_item("https://cars.example.com/mgb").unwrap();
    assert_eq!(mgb.category, "Cars");
    let thresholds = mgb.thresholds.as_ref().unwrap();
    assert_eq!(thresholds.min_amount(), Decimal::from(250));
    assert_eq!(thresholds.min_percent(), Decimal::new(25, 1));

    let enabled: Vec<_> = config.enabled_items().map(|item| item.name.as_str()).collect();
    assert_eq!(enabled, vec!["1972 MGB Roadster"]);
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = write_config(&CONFIG.replace("friday", "someday"));
    let result = AppConfig::from_file(file.path());

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("day_of_week"));
}

#[test]
fn test_unknown_timezone_is_rejected() {
    let file = write_config(&CONFIG.replace("Europe/London", "Europe/Atlantis"));
    let result = AppConfig::from_file(file.path());

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Invalid schedule timezone"));
}

#[tokio::test]
async fn test_reload_swaps_snapshot() {
    let file = write_config(CONFIG);
    let handle = ConfigHandle::new(AppConfig::from_file(file.path()).unwrap());
    let before = handle.current().await;

    let mut updated = before.config.clone();
    updated.items[1].enabled = true;
    assert_eq!(handle.reload(updated).await.unwrap(), 2);

    // A pass holding the old snapshot keeps its view
    assert_eq!(before.config.enabled_items().count(), 1);
    let after = handle.current().await;
    assert_eq!(after.version, 2);
    assert_eq!(after.config.enabled_items().count(), 2);

    let mut broken = after.config.clone();
    broken.items[0].url = "ftp://cars.example.com/mgb".to_string();
    assert!(handle.reload(broken).await.is_err());
    assert_eq!(handle.current().await.version, 2);
}
