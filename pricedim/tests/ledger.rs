#![cfg(feature = "test-utils")]

use chrono::{Duration, Utc};
use pricedim::error::ErrorKind;
use pricedim::ledger::RunLedger;
use pricedim::store::LedgerStore;
use pricedim::store::memory::MemoryStore;
use pricedim::types::{BatchId, MAX_ERROR_SUMMARY_CHARS, RunCounts, RunStatus, Stage};
use pricedim_telemetry::tracing::init_test_tracing;

fn run_ledger(store: MemoryStore) -> RunLedger<MemoryStore> {
    RunLedger::new(store, 1, 3_600)
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_run_becomes_latest_success() {
    init_test_tracing();

    let store = MemoryStore::new();
    let ledger = run_ledger(store.clone());
    let batch = BatchId::generate();

    let entry_id = ledger
        .start(&batch, Stage::Extract, "web", "raw_products")
        .await
        .unwrap();
    ledger
        .finish(
            entry_id,
            Stage::Extract,
            RunStatus::Success,
            RunCounts::new(42, 0, 1),
            None,
        )
        .await
        .unwrap();

    let latest = ledger.latest_success(Stage::Extract).await.unwrap().unwrap();
    assert_eq!(latest.id, entry_id);
    assert_eq!(latest.batch_id, batch);
    assert_eq!(latest.counts.inserted, 42);
    assert!(latest.end_time.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_runs_never_count_as_success() {
    init_test_tracing();

    let ledger = run_ledger(MemoryStore::new());
    let batch = BatchId::generate();

    let entry_id = ledger
        .start(&batch, Stage::Extract, "web", "raw_products")
        .await
        .unwrap();
    ledger
        .finish(
            entry_id,
            Stage::Extract,
            RunStatus::Failed,
            RunCounts::default(),
            Some("crawler timed out"),
        )
        .await
        .unwrap();

    assert!(ledger.latest_success(Stage::Extract).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_concurrent_start_is_rejected() {
    init_test_tracing();

    let ledger = run_ledger(MemoryStore::new());
    let batch = BatchId::generate();

    ledger
        .start(&batch, Stage::LoadStaging, "raw_products", "stg_products")
        .await
        .unwrap();
    let err = ledger
        .start(&batch, Stage::LoadStaging, "raw_products", "stg_products")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(flavor = "multi_thread")]
async fn finish_retry_preserves_first_outcome() {
    init_test_tracing();

    let store = MemoryStore::new();
    let ledger = run_ledger(store.clone());
    let batch = BatchId::generate();

    let entry_id = ledger
        .start(&batch, Stage::LoadWarehouse, "stg_products", "dim_product")
        .await
        .unwrap();
    ledger
        .finish(
            entry_id,
            Stage::LoadWarehouse,
            RunStatus::Success,
            RunCounts::new(3, 1, 0),
            None,
        )
        .await
        .unwrap();
    ledger
        .finish(
            entry_id,
            Stage::LoadWarehouse,
            RunStatus::Failed,
            RunCounts::default(),
            Some("spurious retry"),
        )
        .await
        .unwrap();

    let entries = store.all_ledger_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, RunStatus::Success);
    assert_eq!(entries[0].counts.inserted, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn finishing_unknown_entry_fails() {
    init_test_tracing();

    let ledger = run_ledger(MemoryStore::new());
    let err = ledger
        .finish(
            999,
            Stage::Extract,
            RunStatus::Failed,
            RunCounts::default(),
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(flavor = "multi_thread")]
async fn error_summaries_are_truncated_before_persisting() {
    init_test_tracing();

    let store = MemoryStore::new();
    let ledger = run_ledger(store.clone());
    let batch = BatchId::generate();

    let entry_id = ledger
        .start(&batch, Stage::Extract, "web", "raw_products")
        .await
        .unwrap();
    let huge = "x".repeat(10_000);
    ledger
        .finish(
            entry_id,
            Stage::Extract,
            RunStatus::Failed,
            RunCounts::default(),
            Some(&huge),
        )
        .await
        .unwrap();

    let entries = store.all_ledger_entries().await;
    let summary = entries[0].error_summary.as_ref().unwrap();
    assert_eq!(summary.chars().count(), MAX_ERROR_SUMMARY_CHARS);
}

#[tokio::test(flavor = "multi_thread")]
async fn should_run_waits_for_first_upstream_success() {
    init_test_tracing();

    let ledger = run_ledger(MemoryStore::new());

    let run = ledger
        .should_run(Stage::LoadWarehouse, Stage::LoadStaging)
        .await
        .unwrap();
    assert!(!run, "no upstream success means nothing to consume");
}

#[tokio::test(flavor = "multi_thread")]
async fn should_run_follows_upstream_and_dependent_successes() {
    init_test_tracing();

    let store = MemoryStore::new();
    let ledger = run_ledger(store.clone());
    let batch = BatchId::generate();

    // Upstream succeeds once: the dependent stage is due.
    let staging = ledger
        .start(&batch, Stage::LoadStaging, "raw_products", "stg_products")
        .await
        .unwrap();
    ledger
        .finish(
            staging,
            Stage::LoadStaging,
            RunStatus::Success,
            RunCounts::new(10, 0, 0),
            None,
        )
        .await
        .unwrap();
    assert!(
        ledger
            .should_run(Stage::LoadWarehouse, Stage::LoadStaging)
            .await
            .unwrap()
    );

    // The dependent stage succeeds afterwards: nothing new remains.
    let warehouse = ledger
        .start(&batch, Stage::LoadWarehouse, "stg_products", "dim_product")
        .await
        .unwrap();
    ledger
        .finish(
            warehouse,
            Stage::LoadWarehouse,
            RunStatus::Success,
            RunCounts::new(10, 0, 0),
            None,
        )
        .await
        .unwrap();
    assert!(
        !ledger
            .should_run(Stage::LoadWarehouse, Stage::LoadStaging)
            .await
            .unwrap()
    );

    // A fresh upstream success makes the dependent stage due again.
    let batch2 = BatchId::generate();
    let staging2 = ledger
        .start(&batch2, Stage::LoadStaging, "raw_products", "stg_products")
        .await
        .unwrap();
    ledger
        .finish(
            staging2,
            Stage::LoadStaging,
            RunStatus::Success,
            RunCounts::new(4, 0, 0),
            None,
        )
        .await
        .unwrap();
    assert!(
        ledger
            .should_run(Stage::LoadWarehouse, Stage::LoadStaging)
            .await
            .unwrap()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn sweep_ignores_fresh_started_entries() {
    init_test_tracing();

    let store = MemoryStore::new();
    let ledger = run_ledger(store.clone());
    let batch = BatchId::generate();

    ledger
        .start(&batch, Stage::Extract, "web", "raw_products")
        .await
        .unwrap();

    assert_eq!(ledger.sweep_stale().await.unwrap(), 0);

    let entries = store.all_ledger_entries().await;
    assert_eq!(entries[0].status, RunStatus::Started);
}

#[tokio::test(flavor = "multi_thread")]
async fn swept_entries_carry_the_sweep_summary() {
    init_test_tracing();

    let store = MemoryStore::new();
    let batch = BatchId::generate();

    store
        .start_run(&batch, Stage::Extract, "web", "raw_products")
        .await
        .unwrap();

    // A cutoff ahead of now sweeps everything still running.
    let swept = store
        .sweep_stale_runs(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let entries = store.all_ledger_entries().await;
    assert_eq!(entries[0].status, RunStatus::Failed);
    assert_eq!(
        entries[0].error_summary.as_deref(),
        Some("stale started entry swept after timeout")
    );
}
