use super::*;
use chrono::Duration;
use relist_watcher::lifecycle::{LifecycleClassifier, LifecyclePolicy};
use relist_watcher::models::{ListingRecord, Snapshot};
use relist_watcher::store::MemoryHistoryStore;
use rstest::rstest;

fn snapshot(titles: &[&str]) -> Snapshot {
    Snapshot::new(titles.iter().map(|t| listing(t)).collect(), 200)
}

async fn record_for(store: &Arc<dyn HistoryStore>, title: &str) -> anyhow::Result<ListingRecord> {
    let fp = listing(title).fingerprint;
    store
        .get_record(&fp)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no record for {}", title))
}

async fn store_for(kind: &str) -> anyhow::Result<Arc<dyn HistoryStore>> {
    match kind {
        "sqlite" => sqlite_memory_store().await,
        _ => Ok(Arc::new(MemoryHistoryStore::new())),
    }
}

#[rstest]
#[case::memory("memory")]
#[case::sqlite("sqlite")]
#[tokio::test]
async fn test_four_day_scenario(#[case] kind: &str) -> anyhow::Result<()> {
    let store = store_for(kind).await?;
    let classifier = LifecycleClassifier::new(store.clone(), LifecyclePolicy::default());
    let day1 = at(2024, 6, 1, 10, 0);

    // Day 1: baseline sees A.
    let result = classifier.classify(&snapshot(&["A"]), day1, true).await?;
    assert!(!result.has_events());
    assert_eq!(result.created, 1);

    // Day 2: A still there, nothing to report.
    let day2 = day1 + Duration::days(1);
    let result = classifier.classify(&snapshot(&["A"]), day2, false).await?;
    assert!(!result.has_events());
    assert_eq!(record_for(&store, "A").await?.last_seen_at, day2);

    // Day 3: A is gone.
    let day3 = day2 + Duration::days(1);
    let result = classifier.classify(&snapshot(&[]), day3, false).await?;
    assert_eq!(result.disappeared, 1);
    assert_eq!(record_for(&store, "A").await?.disappeared_at, Some(day3));

    // Day 4: back after 25 hours, reported once as relisted.
    let day4 = day3 + Duration::hours(25);
    let result = classifier.classify(&snapshot(&["A"]), day4, false).await?;
    assert_eq!(result.relisted_items.len(), 1);
    assert!(result.new_items.is_empty());

    let a = record_for(&store, "A").await?;
    assert_eq!(a.first_seen_at, day1);
    assert_eq!(a.last_seen_at, day4);
    assert_eq!(a.disappeared_at, None);
    assert_eq!(a.previous_disappeared_at, Some(day3));
    assert_eq!(a.reappeared_at, Some(day4));

    Ok(())
}

#[rstest]
#[case::memory("memory")]
#[case::sqlite("sqlite")]
#[tokio::test]
async fn test_repeated_snapshot_is_idempotent(#[case] kind: &str) -> anyhow::Result<()> {
    let store = store_for(kind).await?;
    let classifier = LifecycleClassifier::new(store.clone(), LifecyclePolicy::default());
    let t0 = at(2024, 6, 1, 10, 0);

    classifier.classify(&snapshot(&["A", "B", "C"]), t0, false).await?;
    for i in 1..=5 {
        let result = classifier
            .classify(&snapshot(&["A", "B", "C"]), t0 + Duration::minutes(30 * i), false)
            .await?;
        assert!(!result.has_events());
        assert_eq!(result.refreshed, 3);
    }

    assert_eq!(record_for(&store, "B").await?.first_seen_at, t0);
    Ok(())
}

#[rstest]
#[case::well_before(Duration::hours(2), false)]
#[case::just_before(Duration::hours(24) - Duration::seconds(1), false)]
#[case::exactly_at(Duration::hours(24), true)]
#[case::after(Duration::hours(30), true)]
#[tokio::test]
async fn test_relist_threshold(#[case] absence: Duration, #[case] relisted: bool) -> anyhow::Result<()> {
    let store: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
    let classifier = LifecycleClassifier::new(store.clone(), LifecyclePolicy::default());
    let t0 = at(2024, 6, 1, 10, 0);
    let gone_at = t0 + Duration::hours(1);

    classifier.classify(&snapshot(&["A"]), t0, true).await?;
    classifier.classify(&snapshot(&[]), gone_at, false).await?;
    let result = classifier.classify(&snapshot(&["A"]), gone_at + absence, false).await?;

    assert_eq!(result.relisted_items.len() == 1, relisted);
    let a = record_for(&store, "A").await?;
    assert!(a.is_present());
    assert_eq!(a.first_seen_at, t0);
    Ok(())
}

#[tokio::test]
async fn test_price_change_looks_like_new_listing() -> anyhow::Result<()> {
    let store: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
    let classifier = LifecycleClassifier::new(store.clone(), LifecyclePolicy::default());
    let t0 = at(2024, 6, 1, 10, 0);

    classifier.classify(&snapshot(&["A"]), t0, true).await?;
    let cheaper = Snapshot::new(vec![ListingObservation::new("A", "80 lei", None, None, "Other")], 200);
    let result = classifier.classify(&cheaper, t0 + Duration::hours(1), false).await?;

    assert_eq!(result.new_items.len(), 1);
    assert_eq!(result.disappeared, 1);
    Ok(())
}
