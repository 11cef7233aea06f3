use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::bail;
use crate::error::{DimResult, ErrorKind};

/// Maximum number of characters kept from an error summary before it is
/// persisted to the ledger.
pub const MAX_ERROR_SUMMARY_CHARS: usize = 500;

/// Truncates an error summary to [`MAX_ERROR_SUMMARY_CHARS`] characters.
pub fn truncate_error_summary(summary: &str) -> String {
    summary.chars().take(MAX_ERROR_SUMMARY_CHARS).collect()
}

/// Opaque identifier grouping all stage executions of one logical pipeline
/// invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh batch identifier, unique per pipeline invocation.
    pub fn generate() -> Self {
        Self(format!("batch_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of pipeline stages tracked by the run ledger.
///
/// Stage names are known at deploy time; callers never pass free-form stage
/// strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Browser-driven crawl landing raw JSON.
    Extract,
    /// Raw JSON into the relational staging table.
    LoadStaging,
    /// Staging into the warehouse dimension table.
    LoadWarehouse,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::LoadStaging => "load_staging",
            Stage::LoadWarehouse => "load_dwh",
        }
    }

    /// Parses a persisted stage name.
    pub fn parse(value: &str) -> DimResult<Self> {
        match value {
            "extract" => Ok(Stage::Extract),
            "load_staging" => Ok(Stage::LoadStaging),
            "load_dwh" => Ok(Stage::LoadWarehouse),
            other => bail!(
                ErrorKind::ConversionError,
                "Unknown pipeline stage",
                format!("'{other}' is not a recognized stage name")
            ),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one ledger entry.
///
/// Lifecycle: entries are created as [`RunStatus::Started`] and receive
/// exactly one terminal update. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Started,
    Success,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    /// Parses a persisted status value.
    pub fn parse(value: &str) -> DimResult<Self> {
        match value {
            "started" => Ok(RunStatus::Started),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => bail!(
                ErrorKind::ConversionError,
                "Unknown run status",
                format!("'{other}' is not a recognized ledger status")
            ),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row counts reported when a stage finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl RunCounts {
    pub fn new(inserted: u64, updated: u64, skipped: u64) -> Self {
        Self {
            inserted,
            updated,
            skipped,
        }
    }
}

/// One pipeline-stage execution as recorded in the run ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: i64,
    pub batch_id: BatchId,
    pub stage: Stage,
    pub source_table: String,
    pub target_table: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    /// Null while the stage is running.
    pub end_time: Option<DateTime<Utc>>,
    pub counts: RunCounts,
    pub error_summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_batch_ids_are_unique() {
        assert_ne!(BatchId::generate(), BatchId::generate());
    }

    #[test]
    fn stage_names_round_trip() {
        for stage in [Stage::Extract, Stage::LoadStaging, Stage::LoadWarehouse] {
            assert_eq!(Stage::parse(stage.as_str()).unwrap(), stage);
        }
        assert!(Stage::parse("report").is_err());
    }

    #[test]
    fn terminal_statuses_are_final() {
        assert!(!RunStatus::Started.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn error_summaries_are_bounded() {
        let long = "x".repeat(2_000);
        assert_eq!(truncate_error_summary(&long).len(), MAX_ERROR_SUMMARY_CHARS);
    }
}
