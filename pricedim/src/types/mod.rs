//! Core data model for the incremental load engine.

mod dimension;
mod ledger;
mod record;

pub use dimension::{
    ApplyStats, DimensionVersion, Expiry, NewVersion, RESERVED_COLUMNS, is_reserved_column,
};
pub use ledger::{
    BatchId, LedgerEntry, MAX_ERROR_SUMMARY_CHARS, RunCounts, RunStatus, Stage,
    truncate_error_summary,
};
pub use record::{AttributeKind, AttributeValue, StagedRecord};

pub use pricedim_config::shared::PipelineId;
