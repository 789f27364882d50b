use super::*;
use chrono::Duration;
use relist_watcher::models::NotifyMode;
use relist_watcher::scheduler::SkipReason;
use relist_watcher::store::MemoryHistoryStore;
use relist_watcher::RunOutcome;

async fn baselined_daily() -> anyhow::Result<Harness> {
    let h = harness(Arc::new(MemoryHistoryStore::new()), NotifyMode::Daily);
    h.source.show(&["KALLAX"]);
    // 09:10 local on May 31st.
    h.driver.run(NotifyMode::Daily, at(2024, 5, 31, 6, 10)).await?;
    Ok(h)
}

#[tokio::test]
async fn test_daily_digest_sent_at_most_once_per_day() -> anyhow::Result<()> {
    let h = baselined_daily().await?;
    h.source.show(&["KALLAX", "MALM"]);

    let first = h.driver.run(NotifyMode::Daily, at(2024, 6, 1, 6, 0)).await?;
    let second = h.driver.run(NotifyMode::Daily, at(2024, 6, 1, 6, 30)).await?;

    assert_eq!(first, RunOutcome::Completed { parsed: 2, notified: 1 });
    assert!(matches!(second, RunOutcome::Skipped(SkipReason::DigestAlreadySent(_))));
    assert_eq!(h.notifier.sent().len(), 1);
    assert!(h.store.has_digest_for_date(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()).await?);
    Ok(())
}

#[tokio::test]
async fn test_daily_outside_hour_does_nothing() -> anyhow::Result<()> {
    let h = baselined_daily().await?;
    let fetches_before = h.source.fetch_count();
    let runs_before = h.store.recent_runs(100).await?.len();

    // 14:00 local.
    let outcome = h.driver.run(NotifyMode::Daily, at(2024, 6, 1, 11, 0)).await?;

    assert!(matches!(outcome, RunOutcome::Skipped(SkipReason::OutsideDailyHour { .. })));
    assert_eq!(h.source.fetch_count(), fetches_before);
    assert_eq!(h.store.recent_runs(100).await?.len(), runs_before);
    assert!(h.notifier.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_empty_daily_digest_still_marks_ledger() -> anyhow::Result<()> {
    let h = baselined_daily().await?;

    let outcome = h.driver.run(NotifyMode::Daily, at(2024, 6, 1, 6, 0)).await?;

    assert_eq!(outcome, RunOutcome::Completed { parsed: 1, notified: 0 });
    assert!(h.notifier.sent().is_empty());
    let again = h.driver.run(NotifyMode::Daily, at(2024, 6, 1, 6, 40)).await?;
    assert!(matches!(again, RunOutcome::Skipped(SkipReason::DigestAlreadySent(_))));
    Ok(())
}

#[tokio::test]
async fn test_daily_relisted_ignores_debounce() -> anyhow::Result<()> {
    let h = baselined_daily().await?;
    let classifier = relist_watcher::lifecycle::LifecycleClassifier::new(
        h.store.clone(),
        relist_watcher::lifecycle::LifecyclePolicy::default(),
    );
    let snapshot = |titles: &[&str]| {
        relist_watcher::models::Snapshot::new(titles.iter().map(|t| listing(t)).collect(), 200)
    };

    // Gone late on May 31st (local), back early June 1st: only a few hours
    // absent, so instant mode would stay quiet, but the digest lists it.
    let gone_at = at(2024, 5, 31, 20, 0);
    classifier.classify(&snapshot(&[]), gone_at, false).await?;
    let back = classifier
        .classify(&snapshot(&["KALLAX"]), gone_at + Duration::hours(5), false)
        .await?;
    assert!(back.relisted_items.is_empty());

    let outcome = h.driver.run(NotifyMode::Daily, at(2024, 6, 1, 6, 0)).await?;

    assert_eq!(outcome, RunOutcome::Completed { parsed: 1, notified: 1 });
    let sent = h.notifier.sent();
    assert_eq!(sent[0].items[0].title, "KALLAX");
    assert_eq!(sent[0].items[0].kind, relist_watcher::models::ItemKind::Relisted);
    Ok(())
}

#[tokio::test]
async fn test_instant_invocation_skipped_when_configured_daily() -> anyhow::Result<()> {
    let h = baselined_daily().await?;
    let fetches_before = h.source.fetch_count();

    let outcome = h.driver.run(NotifyMode::Instant, at(2024, 6, 1, 6, 0)).await?;

    assert!(matches!(outcome, RunOutcome::Skipped(SkipReason::ModeMismatch { .. })));
    assert_eq!(h.source.fetch_count(), fetches_before);
    Ok(())
}

#[tokio::test]
async fn test_daily_after_same_day_baseline_lists_catalog() -> anyhow::Result<()> {
    // The baseline does not mark the digest ledger, so a second invocation in
    // the same hour reports everything stored by the baseline as first seen.
    let h = baselined_daily().await?;
    h.source.show(&["KALLAX", "MALM"]);

    let outcome = h.driver.run(NotifyMode::Daily, at(2024, 5, 31, 6, 40)).await?;

    assert_eq!(outcome, RunOutcome::Completed { parsed: 2, notified: 2 });
    let sent = h.notifier.sent();
    let mut titles: Vec<_> = sent[0].items.iter().map(|i| i.title.as_str()).collect();
    titles.sort_unstable();
    assert_eq!(titles, vec!["KALLAX", "MALM"]);
    assert!(sent[0].items.iter().all(|i| i.kind == relist_watcher::models::ItemKind::New));
    Ok(())
}
