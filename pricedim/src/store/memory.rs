use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{DimResult, ErrorKind};
use crate::failpoints::{APPLY_CHANGES__BEFORE_COMMIT, FINISH_RUN__BEFORE_WRITE, dim_fail_point};
use crate::store::dimension::{AttributeColumn, DimensionStore};
use crate::store::ledger::LedgerStore;
use crate::types::{
    ApplyStats, BatchId, DimensionVersion, Expiry, LedgerEntry, NewVersion, RunCounts, RunStatus,
    Stage, is_reserved_column, truncate_error_summary,
};

/// Inner state of [`MemoryStore`].
#[derive(Debug, Default)]
struct Inner {
    /// Every dimension row ever inserted, current and superseded alike,
    /// keyed by surrogate id.
    rows: HashMap<i64, DimensionVersion>,
    /// Attribute columns the dimension "table" currently has.
    columns: Vec<AttributeColumn>,
    /// All ledger entries keyed by entry id.
    ledger: HashMap<i64, LedgerEntry>,
    next_surrogate_id: i64,
    next_entry_id: i64,
}

/// In-memory storage for dimension rows and ledger entries.
///
/// [`MemoryStore`] implements both [`DimensionStore`] and [`LedgerStore`],
/// providing a complete storage solution that keeps all data in memory. This
/// is ideal for testing and development; everything is lost on process
/// restart.
///
/// Apply is two-phase to match the transactional store: the changeset is
/// validated and staged against a copy first, and the shared state is only
/// replaced once staging fully succeeds.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored dimension row, including superseded versions.
    ///
    /// Test helper; rows come back ordered by surrogate id.
    pub async fn all_versions(&self) -> Vec<DimensionVersion> {
        let inner = self.inner.lock().await;
        let mut rows = inner.rows.values().cloned().collect::<Vec<_>>();
        rows.sort_by_key(|row| row.surrogate_id);
        rows
    }

    /// Returns every ledger entry, ordered by entry id. Test helper.
    pub async fn all_ledger_entries(&self) -> Vec<LedgerEntry> {
        let inner = self.inner.lock().await;
        let mut entries = inner.ledger.values().cloned().collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.id);
        entries
    }
}

impl DimensionStore for MemoryStore {
    async fn ensure_attribute_columns(&self, columns: &[AttributeColumn]) -> DimResult<()> {
        let mut inner = self.inner.lock().await;

        for column in columns {
            if is_reserved_column(&column.name) {
                bail!(
                    ErrorKind::SchemaConflict,
                    "Attribute collides with a reserved column",
                    format!("'{}' is a dimension metadata column", column.name)
                );
            }

            if !inner.columns.iter().any(|known| known.name == column.name) {
                inner.columns.push(column.clone());
            }
        }

        Ok(())
    }

    async fn current_versions(&self) -> DimResult<Vec<DimensionVersion>> {
        let inner = self.inner.lock().await;

        let mut rows = inner
            .rows
            .values()
            .filter(|row| row.is_current)
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.natural_key.cmp(&b.natural_key));

        Ok(rows)
    }

    async fn apply(&self, inserts: &[NewVersion], expirations: &[Expiry]) -> DimResult<ApplyStats> {
        let mut inner = self.inner.lock().await;

        // Stage against a copy so a mid-apply failure leaves the shared
        // state untouched, mirroring a rolled-back transaction.
        let mut staged_rows = inner.rows.clone();
        let mut next_surrogate_id = inner.next_surrogate_id;
        let mut stats = ApplyStats::default();

        for expiry in expirations {
            match staged_rows.get_mut(&expiry.surrogate_id) {
                Some(row) if row.is_current => {
                    row.is_current = false;
                    row.effective_end = Some(expiry.effective_end);
                    stats.expired += 1;
                }
                Some(_) => bail!(
                    ErrorKind::AtomicApplyFailed,
                    "Expiry targets a non-current version",
                    format!("surrogate id {} is already expired", expiry.surrogate_id)
                ),
                None => bail!(
                    ErrorKind::AtomicApplyFailed,
                    "Expiry targets an unknown version",
                    format!("surrogate id {} does not exist", expiry.surrogate_id)
                ),
            }
        }

        for insert in inserts {
            next_surrogate_id += 1;
            staged_rows.insert(
                next_surrogate_id,
                DimensionVersion {
                    surrogate_id: next_surrogate_id,
                    natural_key: insert.natural_key.clone(),
                    attributes: insert.attributes.clone(),
                    fingerprint: insert.fingerprint.clone(),
                    effective_start: insert.effective_start,
                    effective_end: None,
                    is_current: true,
                    version_no: insert.version_no,
                },
            );
            stats.inserted += 1;
        }

        dim_fail_point(APPLY_CHANGES__BEFORE_COMMIT)?;

        inner.rows = staged_rows;
        inner.next_surrogate_id = next_surrogate_id;

        Ok(stats)
    }
}

impl LedgerStore for MemoryStore {
    async fn start_run(
        &self,
        batch_id: &BatchId,
        stage: Stage,
        source_table: &str,
        target_table: &str,
    ) -> DimResult<i64> {
        let mut inner = self.inner.lock().await;

        let already_started = inner.ledger.values().any(|entry| {
            entry.batch_id == *batch_id
                && entry.stage == stage
                && entry.status == RunStatus::Started
        });
        if already_started {
            bail!(
                ErrorKind::InvalidState,
                "Stage is already running",
                format!("batch '{batch_id}' stage '{stage}' has an open started entry")
            );
        }

        inner.next_entry_id += 1;
        let entry_id = inner.next_entry_id;
        inner.ledger.insert(
            entry_id,
            LedgerEntry {
                id: entry_id,
                batch_id: batch_id.clone(),
                stage,
                source_table: source_table.to_string(),
                target_table: target_table.to_string(),
                status: RunStatus::Started,
                start_time: Utc::now(),
                end_time: None,
                counts: RunCounts::default(),
                error_summary: None,
            },
        );

        Ok(entry_id)
    }

    async fn finish_run(
        &self,
        entry_id: i64,
        status: RunStatus,
        counts: RunCounts,
        error_summary: Option<&str>,
    ) -> DimResult<()> {
        if !status.is_terminal() {
            bail!(
                ErrorKind::InvalidState,
                "Finish requires a terminal status",
                format!("cannot finish entry {entry_id} with status '{status}'")
            );
        }

        dim_fail_point(FINISH_RUN__BEFORE_WRITE)?;

        let mut inner = self.inner.lock().await;

        match inner.ledger.get_mut(&entry_id) {
            Some(entry) if entry.status == RunStatus::Started => {
                entry.status = status;
                entry.end_time = Some(Utc::now());
                entry.counts = counts;
                entry.error_summary = error_summary.map(truncate_error_summary);
                Ok(())
            }
            // Already terminal: a retried finish keeps the first outcome.
            Some(_) => Ok(()),
            None => bail!(
                ErrorKind::InvalidState,
                "Ledger entry does not exist",
                format!("cannot finish unknown entry {entry_id}")
            ),
        }
    }

    async fn latest_success(&self, stage: Stage) -> DimResult<Option<LedgerEntry>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .ledger
            .values()
            .filter(|entry| entry.stage == stage && entry.status == RunStatus::Success)
            .max_by_key(|entry| entry.end_time)
            .cloned())
    }

    async fn sweep_stale_runs(&self, cutoff: DateTime<Utc>) -> DimResult<u64> {
        let mut inner = self.inner.lock().await;

        let mut swept = 0;
        for entry in inner.ledger.values_mut() {
            if entry.status == RunStatus::Started && entry.start_time < cutoff {
                entry.status = RunStatus::Failed;
                entry.end_time = Some(Utc::now());
                entry.error_summary = Some("stale started entry swept after timeout".to_string());
                swept += 1;
            }
        }

        Ok(swept)
    }
}
