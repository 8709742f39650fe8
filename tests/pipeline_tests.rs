mod common;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use cryptomarkets::db::{MarketStore, MemoryMarketStore};
use cryptomarkets::ingestion::{CycleStatus, Pipeline};
use cryptomarkets::models::MarketPredicate;
use cryptomarkets::observability::{EventKind, MemoryRunLog, RunLog};
use cryptomarkets::polymarket::{FetchError, MarketSource};

use common::{build_pipeline, connect_error, fast_config, market_payload, mixed_page, StubSource};

#[tokio::test]
async fn test_cycle_stores_only_crypto_markets() {
    let t = build_pipeline(StubSource::always(mixed_page()));

    let report = t.pipeline.run_cycle().await;

    assert_eq!(report.status, CycleStatus::Succeeded);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.matched, 2);
    assert_eq!(report.stored, 2);

    let rows = t.store.snapshot().unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.market_id.as_str()).collect();
    assert_eq!(ids, vec!["1001", "1002"]);

    for row in &rows {
        assert!(row.active);
        assert!(!row.resolved);
        assert_eq!(row.updated_at, report.run_at);
        assert_eq!(row.created_at, report.run_at);
        assert_eq!(row.yes_price, Some(Decimal::from_str("0.62").unwrap()));
        assert_eq!(row.no_price, Some(Decimal::from_str("0.38").unwrap()));
        assert_eq!(row.volume, Decimal::from_str("15000.5").unwrap());
    }
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let t = build_pipeline(StubSource::always(mixed_page()));

    let first = t.pipeline.run_cycle().await;
    let before = t.store.snapshot().unwrap();
    let second = t.pipeline.run_cycle().await;
    let after = t.store.snapshot().unwrap();

    assert!(first.succeeded() && second.succeeded());
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.id, a.id);
        assert_eq!(b.market_id, a.market_id);
        assert_eq!(b.yes_price, a.yes_price);
        assert_eq!(b.created_at, a.created_at);
        assert_eq!(a.updated_at, second.run_at);
    }
}

#[tokio::test]
async fn test_update_keeps_identity_and_omitted_fields() {
    let updated = json!({
        "id": "1001",
        "question": "Will Bitcoin close above $120k in December?",
        "volume": "99000",
        "volume24hr": "1200",
        "active": false,
    });
    let source = StubSource::scripted(vec![Ok(mixed_page()), Ok(vec![updated])], Vec::new());
    let t = build_pipeline(source);

    t.pipeline.run_cycle().await;
    let original = t.store.find_by_key("1001").await.unwrap().unwrap();

    let report = t.pipeline.run_cycle().await;
    assert!(report.succeeded());
    assert_eq!(report.stored, 1);

    let row = t.store.find_by_key("1001").await.unwrap().unwrap();
    assert_eq!(row.id, original.id);
    assert_eq!(row.created_at, original.created_at);
    assert_eq!(row.updated_at, report.run_at);
    assert!(!row.active);
    assert_eq!(row.volume, Decimal::from(99_000));
    assert_eq!(row.volume_24h, Decimal::from(1_200));
    // Prices were not reported in the second page.
    assert_eq!(row.yes_price, original.yes_price);
    assert_eq!(row.no_price, original.no_price);
}

#[tokio::test]
async fn test_failed_commit_keeps_previous_state() {
    let t = build_pipeline(StubSource::always(mixed_page()));
    t.pipeline.run_cycle().await;
    let before = t.store.snapshot().unwrap();

    t.store.fail_next_commits(1);
    let report = t.pipeline.run_cycle().await;

    assert_eq!(report.status, CycleStatus::Failed);
    assert_eq!(report.stored, 0);
    assert!(report.error.unwrap().contains("rolled back"));
    assert_eq!(t.store.snapshot().unwrap(), before);

    let kinds: Vec<EventKind> = t.run_log.entries().unwrap().iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::CommitFailed));
    assert_eq!(kinds.last(), Some(&EventKind::CycleFailed));
}

#[tokio::test]
async fn test_first_commit_failure_stores_nothing() {
    let t = build_pipeline(StubSource::always(mixed_page()));
    t.store.fail_next_commits(1);

    let report = t.pipeline.run_cycle().await;

    assert!(!report.succeeded());
    assert_eq!(t.store.count_by(MarketPredicate::All).await.unwrap(), 0);
}

#[tokio::test]
async fn test_rejected_record_is_skipped() {
    let t = build_pipeline(StubSource::always(mixed_page()));
    t.store.reject_market("1002");

    let report = t.pipeline.run_cycle().await;

    assert!(report.succeeded());
    assert_eq!(report.normalized, 2);
    assert_eq!(report.stored, 1);
    assert!(t.store.find_by_key("1001").await.unwrap().is_some());
    assert!(t.store.find_by_key("1002").await.unwrap().is_none());

    let skipped: Vec<_> = t
        .run_log
        .entries()
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == EventKind::RecordSkipped)
        .collect();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].message.contains("market_id=1002"));
}

#[tokio::test]
async fn test_payload_without_id_is_skipped() {
    let page = vec![
        json!({ "question": "Bitcoin dominance above 60%?" }),
        market_payload("2001", "Solana ETF approved?"),
    ];
    let t = build_pipeline(StubSource::always(page));

    let report = t.pipeline.run_cycle().await;

    assert!(report.succeeded());
    assert_eq!(report.matched, 2);
    assert_eq!(report.normalized, 1);
    assert_eq!(report.stored, 1);
}

#[tokio::test]
async fn test_fetch_failure_fails_cycle() {
    let source = StubSource::scripted(
        vec![Err(connect_error()), Err(connect_error()), Err(connect_error())],
        mixed_page(),
    );
    let t = build_pipeline(source);

    let report = t.pipeline.run_cycle().await;

    assert_eq!(report.status, CycleStatus::Failed);
    assert_eq!(t.source.call_count(), 3);
    assert!(t.store.snapshot().unwrap().is_empty());

    let kinds: Vec<EventKind> = t.run_log.entries().unwrap().iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::FetchExhausted));
    assert_eq!(kinds.last(), Some(&EventKind::CycleFailed));
}

#[tokio::test]
async fn test_empty_page_fails_cycle() {
    let t = build_pipeline(StubSource::always(Vec::new()));

    let report = t.pipeline.run_cycle().await;

    assert_eq!(report.status, CycleStatus::Failed);
    assert_eq!(report.fetched, 0);
}

#[tokio::test]
async fn test_no_crypto_matches_is_success_with_warning() {
    let page = vec![market_payload("3001", "Who wins the Super Bowl?")];
    let t = build_pipeline(StubSource::always(page));

    let report = t.pipeline.run_cycle().await;

    assert!(report.succeeded());
    assert_eq!(report.matched, 0);
    assert_eq!(report.stored, 0);

    let entries = t.run_log.entries().unwrap();
    let filtered = entries
        .iter()
        .find(|e| e.kind == EventKind::MarketsFiltered)
        .unwrap();
    assert!(filtered.severity.is_issue());
}

#[tokio::test]
async fn test_concurrent_cycles_are_serialized() {
    let t = build_pipeline(StubSource::always(mixed_page()));

    let (a, b) = tokio::join!(t.pipeline.run_guarded(), t.pipeline.run_guarded());

    assert!(a.succeeded() && b.succeeded());
    assert_eq!(t.store.snapshot().unwrap().len(), 2);

    let kinds: Vec<EventKind> = t.run_log.entries().unwrap().iter().map(|e| e.kind).collect();
    let starts: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, k)| **k == EventKind::CycleStarted)
        .map(|(i, _)| i)
        .collect();
    let ends: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, k)| **k == EventKind::CycleSucceeded)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(starts.len(), 2);
    // The second cycle starts only after the first one finished.
    assert!(ends[0] < starts[1]);
}

struct PanickingSource;

#[async_trait]
impl MarketSource for PanickingSource {
    async fn fetch_page(&self, _limit: u32) -> Result<Vec<Value>, FetchError> {
        panic!("payload decoder blew up");
    }
}

#[tokio::test]
async fn test_panicking_cycle_is_recorded_as_failure() {
    let store = Arc::new(MemoryMarketStore::new());
    let run_log = Arc::new(MemoryRunLog::new());
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(PanickingSource),
        store,
        run_log.clone(),
        fast_config(),
    ));

    let report = pipeline.run_guarded().await;
    assert_eq!(report.status, CycleStatus::Failed);
    assert!(report.error.unwrap().contains("aborted"));

    // The pipeline is still usable afterwards.
    let again = pipeline.run_guarded().await;
    assert_eq!(again.status, CycleStatus::Failed);

    let kinds: Vec<EventKind> = run_log.entries().unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds.iter().filter(|k| **k == EventKind::CycleFailed).count(),
        2
    );
}
