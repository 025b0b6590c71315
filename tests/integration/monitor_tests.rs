use rust_decimal::Decimal;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use price_sentinel::models::{AlertEvent, ChangeType, ErrorKind, TrackedItem};
use price_sentinel::store::HistoryStore;
use price_sentinel::ItemOutcome;

use super::*;

async fn serve(server: &MockServer, route: &str, status: u16, body: String) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

#[tokio::test]
async fn test_price_drop_alert_respects_thresholds() {
    let server = MockServer::start().await;
    let url = format!("{}/mgb", server.uri());
    let item = TrackedItem::new(url.as_str(), "1972 MGB Roadster")
        .with_thresholds(Some(Decimal::from(1000)), Some(Decimal::from(10)));
    let snapshot = snapshot(vec![item]);

    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), notifier.clone());

    serve(&server, "/mgb", 200, listing_page("10,000")).await;
    let report = monitor.run_pass(&snapshot).await.unwrap();
    assert_eq!(report.items[0].outcome, ItemOutcome::Baseline { price: Decimal::from(10_000) });

    // 5% and £500: under both thresholds
    serve(&server, "/mgb", 200, listing_page("9,500")).await;
    monitor.run_pass(&snapshot).await.unwrap();
    assert!(notifier.events().is_empty());

    serve(&server, "/mgb", 200, listing_page("8,400")).await;
    monitor.run_pass(&snapshot).await.unwrap();

    // Increases always alert
    serve(&server, "/mgb", 200, listing_page("9,000")).await;
    monitor.run_pass(&snapshot).await.unwrap();

    let events = notifier.events();
    assert_eq!(events.len(), 2);
    match &events[0] {
        AlertEvent::PriceChange(alert) => {
            assert_eq!(alert.previous_price, Decimal::from(9_500));
            assert_eq!(alert.new_price, Decimal::from(8_400));
            assert_eq!(alert.change.change_type, ChangeType::Decreased);
            assert_eq!(alert.mileage, Some(62_000));
            assert_eq!(alert.description.as_deref(), Some("1972 MGB Roadster"));
        }
        other => panic!("expected price change, got {:?}", other),
    }
    assert!(matches!(&events[1], AlertEvent::PriceChange(alert) if alert.change.change_type == ChangeType::Increased));
    assert_eq!(notifier.recipients()[0], vec!["owner@example.com".to_string()]);

    let history = store.price_history(&url, 10).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].price, Decimal::from(9_000));
}

#[tokio::test]
async fn test_missing_listing_escalates_once() {
    let server = MockServer::start().await;
    let url = format!("{}/sold", server.uri());
    let snapshot = snapshot(vec![TrackedItem::new(url.as_str(), "Sold car")]);

    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor(store.clone(), notifier.clone());

    serve(&server, "/sold", 404, String::new()).await;
    for _ in 0..5 {
        let report = monitor.run_pass(&snapshot).await.unwrap();
        assert_eq!(report.items[0].attempts, 1);
    }

    // Permanent errors are not retried
    assert_eq!(request_count(&server).await, 5);
    assert_eq!(store.consecutive_failures(&url).await.unwrap(), 5);

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        AlertEvent::FailureStreak(alert) => {
            assert_eq!(alert.consecutive_failures, 3);
            assert_eq!(alert.error_kind, ErrorKind::NotFound);
            assert_eq!(alert.message, "HTTP 404");
        }
        other => panic!("expected failure streak, got {:?}", other),
    }

    // Relisted: streak resets and the first price is a baseline
    serve(&server, "/sold", 200, listing_page("7,250")).await;
    let report = monitor.run_pass(&snapshot).await.unwrap();
    assert_eq!(report.items[0].outcome, ItemOutcome::Baseline { price: Decimal::from(7_250) });
    assert_eq!(store.consecutive_failures(&url).await.unwrap(), 0);
}

#[tokio::test]
async fn test_forbidden_is_retried_until_exhausted() {
    let server = MockServer::start().await;
    let url = format!("{}/blocked", server.uri());
    let snapshot = snapshot(vec![TrackedItem::new(url.as_str(), "Blocked listing")]);

    let store = memory_store().await;
    let monitor = monitor(store, Arc::new(RecordingNotifier::default()));

    serve(&server, "/blocked", 403, String::new()).await;
    let report = monitor.run_pass(&snapshot).await.unwrap();

    assert_eq!(report.items[0].attempts, 3);
    assert_eq!(request_count(&server).await, 3);
    match &report.items[0].outcome {
        ItemOutcome::Failed { error_kind, message, .. } => {
            assert_eq!(*error_kind, ErrorKind::Forbidden);
            assert!(message.contains("Site blocking automated access"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_error_then_recovery() {
    let server = MockServer::start().await;
    let url = format!("{}/flaky", server.uri());
    let snapshot = snapshot(vec![TrackedItem::new(url.as_str(), "Flaky listing")]);

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page("4,995")))
        .mount(&server)
        .await;

    let store = memory_store().await;
    let monitor = monitor(store.clone(), Arc::new(RecordingNotifier::default()));
    let report = monitor.run_pass(&snapshot).await.unwrap();

    assert_eq!(report.items[0].attempts, 2);
    assert_eq!(report.items[0].outcome, ItemOutcome::Baseline { price: Decimal::from(4_995) });
    // A failure inside a successful scrape is never recorded
    assert_eq!(store.consecutive_failures(&url).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unparseable_page_keeps_snapshot() {
    let server = MockServer::start().await;
    let url = format!("{}/redesigned", server.uri());
    let snapshot = snapshot(vec![TrackedItem::new(url.as_str(), "Redesigned shop")]);

    let store = memory_store().await;
    let monitor = monitor(store.clone(), Arc::new(RecordingNotifier::default()));

    let body = "<html><body><p>Call for price</p></body></html>".to_string();
    serve(&server, "/redesigned", 200, body.clone()).await;
    let report = monitor.run_pass(&snapshot).await.unwrap();

    assert_eq!(report.items[0].attempts, 1);
    assert!(matches!(
        report.items[0].outcome,
        ItemOutcome::Failed { error_kind: ErrorKind::ParseError, .. }
    ));

    let failures = store.failures_since(report.started_at - chrono::Duration::minutes(1)).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].html_snapshot.as_deref(), Some(body.as_str()));
}

#[tokio::test]
async fn test_rejected_alert_does_not_stop_pass() {
    let server = MockServer::start().await;
    let first = format!("{}/first", server.uri());
    let second = format!("{}/second", server.uri());
    let snapshot = snapshot(vec![
        TrackedItem::new(first.as_str(), "First").with_recipients(vec!["first@example.com".to_string()]),
        TrackedItem::new(second.as_str(), "Second"),
    ]);

    let store = memory_store().await;
    let notifier = Arc::new(RecordingNotifier::rejecting());
    let monitor = monitor(store.clone(), notifier.clone());

    Mock::given(method("GET"))
        .and(path("/first"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page("1,000")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/first"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page("900")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/second"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page("2,000")))
        .mount(&server)
        .await;

    monitor.run_pass(&snapshot).await.unwrap();
    let report = monitor.run_pass(&snapshot).await.unwrap();

    assert_eq!(report.items.len(), 2);
    assert_eq!(
        report.items[0].outcome,
        ItemOutcome::PriceChanged {
            previous: Decimal::from(1_000),
            price: Decimal::from(900),
            alerted: false
        }
    );
    assert_eq!(report.items[0].errors, vec!["mailbox full".to_string()]);
    assert_eq!(report.items[1].outcome, ItemOutcome::Unchanged { price: Decimal::from(2_000) });

    assert_eq!(notifier.recipients(), vec![vec!["first@example.com".to_string()]]);
    assert_eq!(store.latest_price(&first).await.unwrap().unwrap().price, Decimal::from(900));
}
