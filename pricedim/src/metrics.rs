//! Metrics definitions for load-engine monitoring.

/// Label for pipeline ID in metrics.
pub const PIPELINE_ID_LABEL: &str = "pipeline_id";

/// Label for dimension table name in metrics.
pub const TABLE_NAME_LABEL: &str = "table_name";

/// Label for pipeline stage in metrics.
pub const STAGE_LABEL: &str = "stage";

// Synchronizer metrics

/// Counter for dimension rows inserted.
pub const DIM_ROWS_INSERTED_TOTAL: &str = "dim_rows_inserted_total";

/// Counter for dimension rows expired.
pub const DIM_ROWS_EXPIRED_TOTAL: &str = "dim_rows_expired_total";

/// Counter for staged records classified as unchanged.
pub const DIM_ROWS_UNCHANGED_TOTAL: &str = "dim_rows_unchanged_total";

/// Counter for staged records skipped during classification.
pub const DIM_ROWS_SKIPPED_TOTAL: &str = "dim_rows_skipped_total";

// Run ledger metrics

/// Counter for stage runs started.
pub const RUNS_STARTED_TOTAL: &str = "runs_started_total";

/// Counter for stage runs finished with success.
pub const RUNS_SUCCEEDED_TOTAL: &str = "runs_succeeded_total";

/// Counter for stage runs finished with failure.
pub const RUNS_FAILED_TOTAL: &str = "runs_failed_total";

/// Counter for stale started entries swept to failed.
pub const RUNS_SWEPT_TOTAL: &str = "runs_swept_total";
