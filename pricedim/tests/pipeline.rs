#![cfg(feature = "test-utils")]

use std::time::Duration;

use pricedim::error::ErrorKind;
use pricedim::pipeline::{Pipeline, StageOutcome};
use pricedim::store::memory::MemoryStore;
use pricedim::test_utils::record::{priced_record, test_pipeline_config};
use pricedim::types::{RunCounts, RunStatus, Stage};
use pricedim_config::shared::SyncMode;
use pricedim_telemetry::tracing::init_test_tracing;
use tokio::time::sleep;

fn pipeline(store: MemoryStore, mode: SyncMode) -> Pipeline<MemoryStore, MemoryStore> {
    Pipeline::new(test_pipeline_config(mode), store.clone(), store).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn stage_run_is_bracketed_by_the_ledger() {
    init_test_tracing();

    let store = MemoryStore::new();
    let pipeline = pipeline(store.clone(), SyncMode::Versioned);

    let counts = pipeline
        .run_stage(Stage::Extract, "web", "raw_products", async {
            Ok(RunCounts::new(17, 0, 2))
        })
        .await
        .unwrap();

    assert_eq!(counts.inserted, 17);

    let entries = store.all_ledger_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].stage, Stage::Extract);
    assert_eq!(entries[0].batch_id, *pipeline.batch_id());
    assert_eq!(entries[0].status, RunStatus::Success);
    assert_eq!(entries[0].counts.inserted, 17);
    assert_eq!(entries[0].counts.skipped, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_stage_records_a_failed_entry() {
    init_test_tracing();

    let store = MemoryStore::new();
    let pipeline = pipeline(store.clone(), SyncMode::Versioned);

    let err = pipeline
        .run_stage(Stage::Extract, "web", "raw_products", async {
            Err(pricedim::dim_error!(
                ErrorKind::Unknown,
                "Crawler crashed",
                "page structure changed"
            ))
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unknown);

    let entries = store.all_ledger_entries().await;
    assert_eq!(entries[0].status, RunStatus::Failed);
    let summary = entries[0].error_summary.as_deref().unwrap();
    assert!(summary.contains("Crawler crashed"), "summary: {summary}");
}

#[tokio::test(flavor = "multi_thread")]
async fn warehouse_load_waits_for_staging_success() {
    init_test_tracing();

    let store = MemoryStore::new();
    let pipeline = pipeline(store.clone(), SyncMode::Versioned);

    let outcome = pipeline
        .sync_staged("stg_products", &[priced_record("P1", 100)])
        .await
        .unwrap();

    assert_eq!(outcome, StageOutcome::NotDue);
    assert!(store.all_versions().await.is_empty());
    assert!(store.all_ledger_entries().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn warehouse_load_runs_after_fresh_staging_success() {
    init_test_tracing();

    let store = MemoryStore::new();
    let pipeline = pipeline(store.clone(), SyncMode::Versioned);

    pipeline
        .run_stage(Stage::LoadStaging, "raw_products", "stg_products", async {
            Ok(RunCounts::new(1, 0, 0))
        })
        .await
        .unwrap();

    let outcome = pipeline
        .sync_staged("stg_products", &[priced_record("P1", 100)])
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::Completed(RunCounts::new(1, 0, 0)));
    assert_eq!(store.all_versions().await.len(), 1);

    // Without a newer staging success the warehouse load is not due again.
    let outcome = pipeline
        .sync_staged("stg_products", &[priced_record("P1", 100)])
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::NotDue);

    let warehouse_entries = store
        .all_ledger_entries()
        .await
        .into_iter()
        .filter(|entry| entry.stage == Stage::LoadWarehouse)
        .count();
    assert_eq!(warehouse_entries, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_stage_times_out_and_fails_its_run() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut config = test_pipeline_config(SyncMode::Versioned);
    config.store_timeout_ms = 50;
    let pipeline: Pipeline<MemoryStore, MemoryStore> =
        Pipeline::new(config, store.clone(), store.clone()).unwrap();

    let err = pipeline
        .run_stage(Stage::Extract, "web", "raw_products", async {
            sleep(Duration::from_secs(5)).await;
            Ok(RunCounts::default())
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StageTimeout);

    let entries = store.all_ledger_entries().await;
    assert_eq!(entries[0].status, RunStatus::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_cancels_an_in_flight_stage() {
    init_test_tracing();

    let store = MemoryStore::new();
    let pipeline = pipeline(store.clone(), SyncMode::Versioned);
    let shutdown_tx = pipeline.shutdown_tx();

    let run = pipeline.run_stage(Stage::Extract, "web", "raw_products", async {
        sleep(Duration::from_secs(10)).await;
        Ok(RunCounts::default())
    });
    let trigger = async {
        sleep(Duration::from_millis(50)).await;
        let _ = shutdown_tx.send(());
    };

    let (result, _) = tokio::join!(run, trigger);
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StageCanceled);

    let entries = store.all_ledger_entries().await;
    assert_eq!(entries[0].status, RunStatus::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_config_is_rejected_at_construction() {
    init_test_tracing();

    let mut config = test_pipeline_config(SyncMode::Versioned);
    config.compare_columns.clear();

    let store = MemoryStore::new();
    let err = Pipeline::new(config, store.clone(), store).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}
