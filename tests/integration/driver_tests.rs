use super::*;
use relist_watcher::catalog::FirecrawlSource;
use relist_watcher::config::CatalogConfig;
use relist_watcher::models::{ItemKind, LifecycleState, RunStatus};
use relist_watcher::store::MemoryHistoryStore;
use relist_watcher::RunOutcome;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_baseline_then_normal_runs() -> anyhow::Result<()> {
    let h = harness(Arc::new(MemoryHistoryStore::new()), NotifyMode::Instant);
    h.source.show(&["KALLAX", "MALM", "BILLY"]);

    let first = h.driver.run(NotifyMode::Instant, at(2024, 6, 1, 10, 0)).await?;
    assert_eq!(first, RunOutcome::Baseline { parsed: 3 });
    assert!(h.notifier.sent().is_empty());
    assert_eq!(
        h.store.get_setting(LifecycleState::SETTING_KEY).await?.as_deref(),
        Some("baselined")
    );

    // Nothing changed: no notification.
    let second = h.driver.run(NotifyMode::Instant, at(2024, 6, 1, 10, 15)).await?;
    assert_eq!(second, RunOutcome::Completed { parsed: 3, notified: 0 });
    assert!(h.notifier.sent().is_empty());

    h.source.show(&["KALLAX", "MALM", "BILLY", "LACK"]);
    let third = h.driver.run(NotifyMode::Instant, at(2024, 6, 1, 10, 30)).await?;
    assert_eq!(third, RunOutcome::Completed { parsed: 4, notified: 1 });

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, RECIPIENT);
    assert_eq!(sent[0].items[0].title, "LACK");
    assert_eq!(sent[0].items[0].kind, ItemKind::New);

    let statuses: Vec<_> = h.store.recent_runs(10).await?.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![RunStatus::Ok, RunStatus::Ok, RunStatus::Baseline]);
    Ok(())
}

#[tokio::test]
async fn test_upstream_failure_is_logged_and_returned() -> anyhow::Result<()> {
    let h = harness(Arc::new(MemoryHistoryStore::new()), NotifyMode::Instant);
    h.source.show(&["KALLAX"]);
    h.driver.run(NotifyMode::Instant, at(2024, 6, 1, 10, 0)).await?;

    h.source.fail(true);
    let result = h.driver.run(NotifyMode::Instant, at(2024, 6, 1, 10, 15)).await;

    assert!(matches!(result, Err(AppError::UpstreamFetch(_))));
    let runs = h.store.recent_runs(1).await?;
    assert_eq!(runs[0].status, RunStatus::Error);
    assert_eq!(runs[0].parsed_count, 0);
    assert!(runs[0].message.as_deref().unwrap_or_default().contains("no HTML"));

    // A failed fetch must not sweep the catalog as disappeared.
    let kallax = h.store.get_record(&listing("KALLAX").fingerprint).await?;
    assert!(kallax.is_some_and(|r| r.is_present()));
    Ok(())
}

#[tokio::test]
async fn test_relisted_item_in_instant_run() -> anyhow::Result<()> {
    let h = harness(sqlite_memory_store().await?, NotifyMode::Instant);
    h.source.show(&["KALLAX", "MALM"]);
    h.driver.run(NotifyMode::Instant, at(2024, 6, 1, 10, 0)).await?;

    h.source.show(&["MALM"]);
    h.driver.run(NotifyMode::Instant, at(2024, 6, 1, 12, 0)).await?;

    h.source.show(&["KALLAX", "MALM", "LACK"]);
    let outcome = h.driver.run(NotifyMode::Instant, at(2024, 6, 2, 13, 0)).await?;

    assert_eq!(outcome, RunOutcome::Completed { parsed: 3, notified: 2 });
    let sent = h.notifier.sent();
    let kinds: Vec<_> = sent[0].items.iter().map(|i| (i.title.as_str(), i.kind)).collect();
    assert_eq!(kinds, vec![("LACK", ItemKind::New), ("KALLAX", ItemKind::Relisted)]);
    assert_eq!(sent[0].subject, "[IKEA SH TM] 2 new/relisted listings");
    Ok(())
}

fn catalog_config(api_base: &str) -> CatalogConfig {
    CatalogConfig {
        feed_name: "IKEA SH TM".to_string(),
        url: "https://www.ikea.com/ro/ro/circular/timisoara/".to_string(),
        base_url: "https://www.ikea.com".to_string(),
        api_base: api_base.to_string(),
        api_key: Some("fc-test".to_string()),
        max_items: 200,
        request_timeout: 5,
        currency_marker: "lei".to_string(),
    }
}

fn page(cards: &[(&str, &str)]) -> serde_json::Value {
    let body: String = cards
        .iter()
        .map(|(title, price)| {
            format!(
                r#"<a href="/ro/ro/circular/item/{title}"><img src="https://img.ikea.com/{title}.jpg"/><span>{title}</span><span>{price}</span></a>"#
            )
        })
        .collect();
    json!({ "success": true, "data": { "html": format!("<html><body>{}</body></html>", body) } })
}

#[tokio::test]
async fn test_scrape_to_file_store_end_to_end() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;
    let database = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("data/history.db").display()),
        max_connections: 2,
    };

    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .and(header("authorization", "Bearer fc-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[("KALLAX raft", "250 lei")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[
            ("KALLAX raft", "250 lei"),
            ("POÄNG fotoliu", "300 lei"),
        ])))
        .mount(&server)
        .await;

    let build = |store: Arc<dyn HistoryStore>, notifier: Arc<RecordingNotifier>| -> anyhow::Result<RunDriver> {
        let policy = DeliveryPolicy {
            configured_mode: NotifyMode::Instant,
            feed_name: "IKEA SH TM".to_string(),
            ..Default::default()
        };
        Ok(RunDriver::new(
            store.clone(),
            Arc::new(FirecrawlSource::new(&catalog_config(&server.uri()))?),
            notifier,
            LifecycleClassifier::new(store.clone(), LifecyclePolicy::default()),
            NotificationScheduler::new(store, policy),
            RECIPIENT,
            200,
        ))
    };

    // First process: baseline.
    {
        let store: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::connect(&database).await?);
        let driver = build(store, Arc::new(RecordingNotifier::default()))?;
        let outcome = driver.run(NotifyMode::Instant, at(2024, 6, 1, 10, 0)).await?;
        assert_eq!(outcome, RunOutcome::Baseline { parsed: 1 });
    }

    // Second process reopens the same file and sees only the new chair.
    let store: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::connect(&database).await?);
    let notifier = Arc::new(RecordingNotifier::default());
    let driver = build(store, notifier.clone())?;
    let outcome = driver.run(NotifyMode::Instant, at(2024, 6, 1, 10, 15)).await?;

    assert_eq!(outcome, RunOutcome::Completed { parsed: 2, notified: 1 });
    let item = &notifier.sent()[0].items[0];
    assert_eq!(item.title, "POÄNG fotoliu");
    assert_eq!(item.category, "Seating");
    assert_eq!(
        item.item_url.as_deref(),
        Some("https://www.ikea.com/ro/ro/circular/item/PO%C3%84NG%20fotoliu")
    );
    Ok(())
}

fn keyless_driver(store: Arc<dyn HistoryStore>) -> anyhow::Result<RunDriver> {
    let mut catalog = catalog_config("http://127.0.0.1:9");
    catalog.api_key = None;
    let policy = DeliveryPolicy {
        configured_mode: NotifyMode::Instant,
        ..Default::default()
    };
    Ok(RunDriver::new(
        store.clone(),
        Arc::new(FirecrawlSource::new(&catalog)?),
        Arc::new(RecordingNotifier::default()),
        LifecycleClassifier::new(store.clone(), LifecyclePolicy::default()),
        NotificationScheduler::new(store, policy),
        RECIPIENT,
        200,
    ))
}

#[tokio::test]
async fn test_missing_api_key_recorded_as_error_run() -> anyhow::Result<()> {
    let store = sqlite_memory_store().await?;
    let driver = keyless_driver(store.clone())?;

    let result = driver.run(NotifyMode::Instant, at(2024, 6, 1, 10, 0)).await;

    assert!(matches!(result, Err(AppError::Configuration(_))));
    let runs = store.recent_runs(10).await?;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Error);
    assert!(runs[0].message.as_deref().unwrap_or_default().contains("catalog.api_key"));
    Ok(())
}

#[tokio::test]
async fn test_skipped_run_needs_no_api_key() -> anyhow::Result<()> {
    let store = sqlite_memory_store().await?;
    let driver = keyless_driver(store.clone())?;

    let outcome = driver.run(NotifyMode::Daily, at(2024, 6, 1, 6, 0)).await?;

    assert!(matches!(
        outcome,
        RunOutcome::Skipped(relist_watcher::scheduler::SkipReason::ModeMismatch { .. })
    ));
    assert!(store.recent_runs(10).await?.is_empty());
    Ok(())
}
