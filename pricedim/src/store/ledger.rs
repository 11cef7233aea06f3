use chrono::{DateTime, Utc};

use crate::error::DimResult;
use crate::types::{BatchId, LedgerEntry, RunCounts, RunStatus, Stage};

/// Trait for persisting the ETL run ledger.
///
/// The ledger is the pipeline's control plane: every stage execution is
/// recorded as `started` before any work happens and finished with exactly
/// one terminal status. Implementations must reject a second concurrent
/// `started` entry for the same batch and stage.
pub trait LedgerStore {
    /// Records the start of a stage execution and returns the entry id.
    ///
    /// Fails with [`crate::error::ErrorKind::InvalidState`] when a `started`
    /// entry for the same batch and stage already exists.
    fn start_run(
        &self,
        batch_id: &BatchId,
        stage: Stage,
        source_table: &str,
        target_table: &str,
    ) -> impl Future<Output = DimResult<i64>> + Send;

    /// Finishes a stage execution with a terminal status.
    ///
    /// Idempotent: finishing an entry that is already terminal is a no-op and
    /// preserves the first outcome. Finishing an unknown entry id fails with
    /// [`crate::error::ErrorKind::InvalidState`].
    fn finish_run(
        &self,
        entry_id: i64,
        status: RunStatus,
        counts: RunCounts,
        error_summary: Option<&str>,
    ) -> impl Future<Output = DimResult<()>> + Send;

    /// Returns the most recently finished successful run of a stage, if any.
    fn latest_success(
        &self,
        stage: Stage,
    ) -> impl Future<Output = DimResult<Option<LedgerEntry>>> + Send;

    /// Marks `started` entries older than the cutoff as failed.
    ///
    /// Returns the number of entries swept. Swept entries carry a fixed
    /// error summary so operators can tell a sweep from a real failure.
    fn sweep_stale_runs(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = DimResult<u64>> + Send;
}
