//! Dimension synchronization: one staged batch in, one atomic changeset out.

use std::collections::BTreeMap;

use metrics::counter;
use tracing::{debug, info};

use crate::detect::ChangeDetector;
use crate::error::DimResult;
use crate::metrics::{
    DIM_ROWS_EXPIRED_TOTAL, DIM_ROWS_INSERTED_TOTAL, DIM_ROWS_SKIPPED_TOTAL,
    DIM_ROWS_UNCHANGED_TOTAL, TABLE_NAME_LABEL,
};
use crate::store::{AttributeColumn, DimensionStore};
use crate::types::{AttributeKind, AttributeValue, RunCounts, StagedRecord};

/// Outcome of synchronizing one staged batch into the dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: u64,
    pub expired: u64,
    pub unchanged: u64,
    pub skipped: u64,
}

impl SyncReport {
    /// Maps the report onto ledger row counts: expirations are the "updated"
    /// rows of the run.
    pub fn to_run_counts(self) -> RunCounts {
        RunCounts::new(self.inserted, self.expired, self.skipped)
    }
}

/// Drives one staged batch through schema evolution, classification and the
/// atomic apply.
///
/// The synchronizer owns the batch-level sequencing; all row-level decisions
/// live in [`ChangeDetector`] and all persistence in the [`DimensionStore`].
#[derive(Debug, Clone)]
pub struct Synchronizer<D> {
    store: D,
    detector: ChangeDetector,
    table: String,
}

impl<D> Synchronizer<D>
where
    D: DimensionStore,
{
    pub fn new(store: D, detector: ChangeDetector, table: String) -> Self {
        Self {
            store,
            detector,
            table,
        }
    }

    /// Synchronizes one staged batch into the dimension table.
    ///
    /// An unchanged batch performs no writes at all; the store is only
    /// touched for schema checks and the current-version read.
    pub async fn sync(&self, staged: &[StagedRecord]) -> DimResult<SyncReport> {
        let columns = collect_attribute_columns(staged);
        self.store.ensure_attribute_columns(&columns).await?;

        let current = self.store.current_versions().await?;
        let changeset = self.detector.classify(&current, staged)?;

        for skipped in &changeset.skipped {
            debug!(
                table = %self.table,
                natural_key = %skipped.natural_key,
                reason = %skipped.reason,
                "skipped staged record"
            );
        }

        let stats = if changeset.is_empty() {
            Default::default()
        } else {
            self.store
                .apply(&changeset.to_insert, &changeset.to_expire)
                .await?
        };

        let report = SyncReport {
            inserted: stats.inserted,
            expired: stats.expired,
            unchanged: changeset.unchanged,
            skipped: changeset.skipped.len() as u64,
        };

        info!(
            table = %self.table,
            staged = staged.len(),
            inserted = report.inserted,
            expired = report.expired,
            unchanged = report.unchanged,
            skipped = report.skipped,
            "synchronized staged batch"
        );
        counter!(DIM_ROWS_INSERTED_TOTAL, TABLE_NAME_LABEL => self.table.clone())
            .increment(report.inserted);
        counter!(DIM_ROWS_EXPIRED_TOTAL, TABLE_NAME_LABEL => self.table.clone())
            .increment(report.expired);
        counter!(DIM_ROWS_UNCHANGED_TOTAL, TABLE_NAME_LABEL => self.table.clone())
            .increment(report.unchanged);
        counter!(DIM_ROWS_SKIPPED_TOTAL, TABLE_NAME_LABEL => self.table.clone())
            .increment(report.skipped);

        Ok(report)
    }
}

/// Derives the attribute columns a batch needs from the records themselves.
///
/// Each attribute's column shape comes from its first non-null value in the
/// batch; an attribute that is null throughout falls back to text.
fn collect_attribute_columns(staged: &[StagedRecord]) -> Vec<AttributeColumn> {
    let mut kinds: BTreeMap<&str, Option<AttributeKind>> = BTreeMap::new();

    for record in staged {
        for (name, value) in record.attributes() {
            let entry = kinds.entry(name.as_str()).or_default();
            if entry.is_none() && !matches!(value, AttributeValue::Null) {
                *entry = Some(value.kind());
            }
        }
    }

    kinds
        .into_iter()
        .map(|(name, kind)| AttributeColumn {
            name: name.to_string(),
            kind: kind.unwrap_or(AttributeKind::Text),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(key: &str, attributes: &[(&str, AttributeValue)]) -> StagedRecord {
        let attributes = attributes
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect::<BTreeMap<_, _>>();
        StagedRecord::new(key, attributes, Utc::now())
    }

    #[test]
    fn column_kinds_come_from_first_non_null_value() {
        let staged = vec![
            record("P1", &[("sale_price_vnd", AttributeValue::Null)]),
            record("P2", &[("sale_price_vnd", AttributeValue::I64(100))]),
        ];

        let columns = collect_attribute_columns(&staged);
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].kind, AttributeKind::Integer);
    }

    #[test]
    fn all_null_attribute_falls_back_to_text() {
        let staged = vec![record("P1", &[("notes", AttributeValue::Null)])];

        let columns = collect_attribute_columns(&staged);
        assert_eq!(columns[0].kind, AttributeKind::Text);
    }
}
