//! The pipeline driver: gating, ledger wrapping and cancellation for stage
//! runs.

use std::sync::Arc;
use std::time::Duration;

use pricedim_config::shared::PipelineConfig;
use tokio::time::timeout;
use tracing::{error, info};

use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::detect::ChangeDetector;
use crate::dim_error;
use crate::error::{DimResult, ErrorKind};
use crate::fingerprint::Fingerprinter;
use crate::ledger::RunLedger;
use crate::store::{DimensionStore, LedgerStore};
use crate::sync::Synchronizer;
use crate::types::{BatchId, PipelineId, RunCounts, RunStatus, Stage, StagedRecord};

/// Result of attempting a gated stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage ran and finished successfully.
    Completed(RunCounts),
    /// The upstream stage has produced nothing new since this stage last
    /// succeeded, so the stage did not run.
    NotDue,
}

/// Drives stage executions for one pipeline deployment.
///
/// Every stage run is bracketed by the run ledger: a `started` entry before
/// any work, a terminal entry afterwards, including on timeout and shutdown.
/// Stale entries left behind by a crashed predecessor are swept before each
/// run so the ledger cannot wedge the pipeline forever.
#[derive(Debug)]
pub struct Pipeline<D, L> {
    config: Arc<PipelineConfig>,
    batch_id: BatchId,
    dimension_store: D,
    ledger: RunLedger<L>,
    shutdown_tx: ShutdownTx,
}

impl<D, L> Pipeline<D, L>
where
    D: DimensionStore + Clone + Send + Sync + 'static,
    L: LedgerStore + Send + Sync + 'static,
{
    /// Creates a pipeline with a freshly generated batch id.
    pub fn new(config: PipelineConfig, dimension_store: D, ledger_store: L) -> DimResult<Self> {
        config.validate()?;

        let ledger = RunLedger::new(ledger_store, config.id, config.stale_run_timeout_secs);
        let (shutdown_tx, _) = create_shutdown_channel();

        Ok(Self {
            config: Arc::new(config),
            batch_id: BatchId::generate(),
            dimension_store,
            ledger,
            shutdown_tx,
        })
    }

    pub fn id(&self) -> PipelineId {
        self.config.id
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    /// Returns a handle that cancels all in-flight stage runs when sent on.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Runs one stage, bracketed by the run ledger.
    ///
    /// The body is bounded by the configured store timeout and by the
    /// shutdown channel; both paths record a `failed` ledger entry before the
    /// error is returned.
    pub async fn run_stage<F>(
        &self,
        stage: Stage,
        source_table: &str,
        target_table: &str,
        body: F,
    ) -> DimResult<RunCounts>
    where
        F: Future<Output = DimResult<RunCounts>>,
    {
        self.ledger.sweep_stale().await?;

        let entry_id = self
            .ledger
            .start(&self.batch_id, stage, source_table, target_table)
            .await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let store_timeout = Duration::from_millis(self.config.store_timeout_ms);

        let outcome = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => Err(dim_error!(
                ErrorKind::StageCanceled,
                "Stage canceled by shutdown",
                format!("stage '{stage}' of batch '{}' was interrupted", self.batch_id)
            )),
            result = timeout(store_timeout, body) => match result {
                Ok(result) => result,
                Err(_) => Err(dim_error!(
                    ErrorKind::StageTimeout,
                    "Stage exceeded its store timeout",
                    format!(
                        "stage '{stage}' did not finish within {}ms",
                        self.config.store_timeout_ms
                    )
                )),
            },
        };

        match outcome {
            Ok(counts) => {
                self.ledger
                    .finish(entry_id, stage, RunStatus::Success, counts, None)
                    .await?;

                Ok(counts)
            }
            Err(err) => {
                let summary = err.to_string();
                // Best effort: the original failure is what the caller needs
                // to see, even if the ledger write fails too.
                if let Err(finish_err) = self
                    .ledger
                    .finish(
                        entry_id,
                        stage,
                        RunStatus::Failed,
                        RunCounts::default(),
                        Some(&summary),
                    )
                    .await
                {
                    error!(
                        entry_id,
                        stage = %stage,
                        error = %finish_err,
                        "failed to record stage failure in the ledger"
                    );
                }

                Err(err)
            }
        }
    }

    /// Runs one stage only when its upstream stage has newer data.
    pub async fn run_stage_if_due<F>(
        &self,
        upstream: Stage,
        stage: Stage,
        source_table: &str,
        target_table: &str,
        body: F,
    ) -> DimResult<StageOutcome>
    where
        F: Future<Output = DimResult<RunCounts>>,
    {
        if !self.ledger.should_run(stage, upstream).await? {
            info!(
                pipeline_id = self.config.id,
                upstream = %upstream,
                stage = %stage,
                "stage not due, upstream has no newer success"
            );
            return Ok(StageOutcome::NotDue);
        }

        let counts = self.run_stage(stage, source_table, target_table, body).await?;

        Ok(StageOutcome::Completed(counts))
    }

    /// Synchronizes a staged batch into the dimension table as the warehouse
    /// load stage.
    ///
    /// Gated on the staging load: if staging has produced nothing new since
    /// the last warehouse load, this is a no-op with no ledger entry.
    pub async fn sync_staged(
        &self,
        source_table: &str,
        staged: &[StagedRecord],
    ) -> DimResult<StageOutcome> {
        let fingerprinter = Fingerprinter::new(self.config.compare_columns.clone());
        let detector = ChangeDetector::new(
            fingerprinter,
            self.config.mode,
            self.config.on_normalization_error,
        );
        let synchronizer = Synchronizer::new(
            self.dimension_store.clone(),
            detector,
            self.config.dimension_table.clone(),
        );

        let body = async move { Ok(synchronizer.sync(staged).await?.to_run_counts()) };

        self.run_stage_if_due(
            Stage::LoadStaging,
            Stage::LoadWarehouse,
            source_table,
            &self.config.dimension_table,
            body,
        )
        .await
    }
}
