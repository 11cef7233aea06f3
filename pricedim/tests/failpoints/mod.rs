#![cfg(all(feature = "failpoints", feature = "test-utils"))]

use pricedim::detect::ChangeDetector;
use pricedim::error::ErrorKind;
use pricedim::failpoints::{APPLY_CHANGES__BEFORE_COMMIT, FINISH_RUN__BEFORE_WRITE};
use pricedim::fingerprint::Fingerprinter;
use pricedim::ledger::RunLedger;
use pricedim::store::memory::MemoryStore;
use pricedim::sync::Synchronizer;
use pricedim::test_utils::failpoints::FaultGuard;
use pricedim::test_utils::record::priced_record;
use pricedim::types::{BatchId, RunCounts, RunStatus, Stage};
use pricedim_config::shared::{NormalizationErrorPolicy, SyncMode};
use pricedim_telemetry::tracing::init_test_tracing;

fn synchronizer(store: MemoryStore) -> Synchronizer<MemoryStore> {
    let fingerprinter = Fingerprinter::new(vec![
        "product_name".to_string(),
        "sale_price_vnd".to_string(),
    ]);
    let detector = ChangeDetector::new(
        fingerprinter,
        SyncMode::Versioned,
        NormalizationErrorPolicy::Abort,
    );
    Synchronizer::new(store, detector, "dim_product".to_string())
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_apply_leaves_the_dimension_untouched() {
    init_test_tracing();

    let store = MemoryStore::new();
    let synchronizer = synchronizer(store.clone());

    let faults = FaultGuard::inject(&[(APPLY_CHANGES__BEFORE_COMMIT, "return")]);

    let err = synchronizer
        .sync(&[priced_record("P1", 100)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WithInjectedFault);
    assert!(store.all_versions().await.is_empty());

    faults.clear();

    // The retry applies the identical changeset cleanly.
    let report = synchronizer
        .sync(&[priced_record("P1", 100)])
        .await
        .unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(store.all_versions().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_apply_during_versioning_keeps_the_old_version_current() {
    init_test_tracing();

    let store = MemoryStore::new();
    let synchronizer = synchronizer(store.clone());

    synchronizer
        .sync(&[priced_record("P1", 100)])
        .await
        .unwrap();

    let faults = FaultGuard::inject(&[(APPLY_CHANGES__BEFORE_COMMIT, "return")]);
    let err = synchronizer
        .sync(&[priced_record("P1", 120)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WithInjectedFault);
    faults.clear();

    // Neither half of the insert+expire pair took effect.
    let versions = store.all_versions().await;
    assert_eq!(versions.len(), 1);
    assert!(versions[0].is_current);
    assert_eq!(versions[0].effective_end, None);

    let report = synchronizer
        .sync(&[priced_record("P1", 120)])
        .await
        .unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.expired, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_finish_leaves_the_entry_started_for_a_retry() {
    init_test_tracing();

    let store = MemoryStore::new();
    let ledger = RunLedger::new(store.clone(), 1, 3_600);
    let batch = BatchId::generate();

    let entry_id = ledger
        .start(&batch, Stage::Extract, "web", "raw_products")
        .await
        .unwrap();

    let faults = FaultGuard::inject(&[(FINISH_RUN__BEFORE_WRITE, "return")]);
    let err = ledger
        .finish(
            entry_id,
            Stage::Extract,
            RunStatus::Success,
            RunCounts::new(1, 0, 0),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WithInjectedFault);
    faults.clear();

    let entries = store.all_ledger_entries().await;
    assert_eq!(entries[0].status, RunStatus::Started);

    // The retry terminates the entry normally.
    ledger
        .finish(
            entry_id,
            Stage::Extract,
            RunStatus::Success,
            RunCounts::new(1, 0, 0),
            None,
        )
        .await
        .unwrap();
    let entries = store.all_ledger_entries().await;
    assert_eq!(entries[0].status, RunStatus::Success);
}
