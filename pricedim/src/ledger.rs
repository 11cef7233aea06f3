//! Control-plane operations over the ETL run ledger.

use chrono::{Duration, Utc};
use metrics::counter;
use tracing::{info, warn};

use crate::error::DimResult;
use crate::metrics::{
    PIPELINE_ID_LABEL, RUNS_FAILED_TOTAL, RUNS_STARTED_TOTAL, RUNS_SUCCEEDED_TOTAL,
    RUNS_SWEPT_TOTAL, STAGE_LABEL,
};
use crate::store::LedgerStore;
use crate::types::{
    BatchId, LedgerEntry, PipelineId, RunCounts, RunStatus, Stage, truncate_error_summary,
};

/// The run ledger's control-plane API, generic over its persistence.
///
/// [`RunLedger`] wraps a [`LedgerStore`] with run gating, error-summary
/// bounding, stale-entry sweeping and observability. Pipeline code talks to
/// this type, never to the store directly.
#[derive(Debug, Clone)]
pub struct RunLedger<L> {
    store: L,
    pipeline_id: PipelineId,
    stale_run_timeout: Duration,
}

impl<L> RunLedger<L>
where
    L: LedgerStore,
{
    pub fn new(store: L, pipeline_id: PipelineId, stale_run_timeout_secs: u64) -> Self {
        Self {
            store,
            pipeline_id,
            stale_run_timeout: Duration::seconds(stale_run_timeout_secs as i64),
        }
    }

    /// Records the start of a stage execution and returns the entry id.
    pub async fn start(
        &self,
        batch_id: &BatchId,
        stage: Stage,
        source_table: &str,
        target_table: &str,
    ) -> DimResult<i64> {
        let entry_id = self
            .store
            .start_run(batch_id, stage, source_table, target_table)
            .await?;

        info!(
            pipeline_id = self.pipeline_id,
            batch_id = %batch_id,
            stage = %stage,
            entry_id,
            "stage started"
        );
        counter!(
            RUNS_STARTED_TOTAL,
            PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
            STAGE_LABEL => stage.as_str()
        )
        .increment(1);

        Ok(entry_id)
    }

    /// Finishes a stage execution with a terminal status.
    ///
    /// Error summaries are truncated before they reach the store so a single
    /// failing batch cannot bloat the ledger.
    pub async fn finish(
        &self,
        entry_id: i64,
        stage: Stage,
        status: RunStatus,
        counts: RunCounts,
        error_summary: Option<&str>,
    ) -> DimResult<()> {
        let truncated = error_summary.map(truncate_error_summary);
        self.store
            .finish_run(entry_id, status, counts, truncated.as_deref())
            .await?;

        match status {
            RunStatus::Success => {
                info!(
                    pipeline_id = self.pipeline_id,
                    stage = %stage,
                    entry_id,
                    inserted = counts.inserted,
                    updated = counts.updated,
                    skipped = counts.skipped,
                    "stage succeeded"
                );
                counter!(
                    RUNS_SUCCEEDED_TOTAL,
                    PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
                    STAGE_LABEL => stage.as_str()
                )
                .increment(1);
            }
            _ => {
                warn!(
                    pipeline_id = self.pipeline_id,
                    stage = %stage,
                    entry_id,
                    error_summary = truncated.as_deref().unwrap_or(""),
                    "stage failed"
                );
                counter!(
                    RUNS_FAILED_TOTAL,
                    PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
                    STAGE_LABEL => stage.as_str()
                )
                .increment(1);
            }
        }

        Ok(())
    }

    /// Returns the most recently finished successful run of a stage.
    pub async fn latest_success(&self, stage: Stage) -> DimResult<Option<LedgerEntry>> {
        self.store.latest_success(stage).await
    }

    /// Decides whether a dependent stage has new upstream data to process.
    ///
    /// A stage runs when its upstream stage has succeeded more recently than
    /// the dependent stage's own last success. An upstream that has never
    /// succeeded means there is nothing to consume yet, so the dependent
    /// stage does not run.
    pub async fn should_run(&self, dependent: Stage, upstream: Stage) -> DimResult<bool> {
        let (dependent_success, upstream_success) = futures::future::try_join(
            self.store.latest_success(dependent),
            self.store.latest_success(upstream),
        )
        .await?;

        let run = match (upstream_success, dependent_success) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(upstream), Some(dependent)) => upstream.end_time > dependent.end_time,
        };

        Ok(run)
    }

    /// Marks `started` entries older than the configured timeout as failed.
    pub async fn sweep_stale(&self) -> DimResult<u64> {
        let cutoff = Utc::now() - self.stale_run_timeout;
        let swept = self.store.sweep_stale_runs(cutoff).await?;

        if swept > 0 {
            warn!(
                pipeline_id = self.pipeline_id,
                swept, "swept stale started ledger entries"
            );
            counter!(
                RUNS_SWEPT_TOTAL,
                PIPELINE_ID_LABEL => self.pipeline_id.to_string()
            )
            .increment(swept);
        }

        Ok(swept)
    }
}
