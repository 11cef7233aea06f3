//! Pure change classification between staged records and current dimension
//! versions.

use std::collections::HashMap;

use pricedim_config::shared::{NormalizationErrorPolicy, SyncMode};

use crate::error::{DimError, DimResult, ErrorKind};
use crate::fingerprint::Fingerprinter;
use crate::types::{DimensionVersion, Expiry, NewVersion, StagedRecord};

/// A record dropped during classification, with a reason for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub natural_key: String,
    pub reason: String,
}

/// The full set of writes a batch requires, computed before any store I/O.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    pub to_insert: Vec<NewVersion>,
    pub to_expire: Vec<Expiry>,
    pub unchanged: u64,
    pub skipped: Vec<SkippedRecord>,
}

impl Changeset {
    /// True when the batch requires no store writes at all.
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_expire.is_empty()
    }
}

/// Classifies staged records against the currently effective dimension rows.
///
/// The detector is pure: it performs no I/O and holds no store handles, which
/// keeps classification testable without a database. Callers must pass staged
/// records that are already deduplicated by natural key; the detector indexes
/// current versions by key and assumes one staged record per key.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    fingerprinter: Fingerprinter,
    mode: SyncMode,
    on_normalization_error: NormalizationErrorPolicy,
}

impl ChangeDetector {
    pub fn new(
        fingerprinter: Fingerprinter,
        mode: SyncMode,
        on_normalization_error: NormalizationErrorPolicy,
    ) -> Self {
        Self {
            fingerprinter,
            mode,
            on_normalization_error,
        }
    }

    /// Classifies every staged record into insert, expire, unchanged or
    /// skipped.
    ///
    /// In versioned mode a changed record yields both a new version insert and
    /// an expiry of the superseded row, paired so the effective-date windows
    /// abut exactly. In dedup-only mode any existing key counts as unchanged
    /// regardless of content.
    pub fn classify(
        &self,
        current: &[DimensionVersion],
        staged: &[StagedRecord],
    ) -> DimResult<Changeset> {
        let current_by_key = current
            .iter()
            .filter(|version| version.is_current)
            .map(|version| (version.natural_key.as_str(), version))
            .collect::<HashMap<_, _>>();

        let mut changeset = Changeset::default();

        for record in staged {
            if record.natural_key().trim().is_empty() {
                changeset.skipped.push(SkippedRecord {
                    natural_key: record.natural_key().to_string(),
                    reason: "empty natural key".to_string(),
                });
                continue;
            }

            let fingerprint = match self.fingerprinter.fingerprint(record) {
                Ok(fingerprint) => fingerprint,
                Err(err) if matches!(self.on_normalization_error, NormalizationErrorPolicy::Skip) => {
                    changeset.skipped.push(SkippedRecord {
                        natural_key: record.natural_key().to_string(),
                        reason: err.to_string(),
                    });
                    continue;
                }
                Err(err) => {
                    return Err(DimError::from((
                        ErrorKind::NormalizationFailed,
                        "Batch aborted on normalization failure",
                        format!("record '{}' failed to canonicalize", record.natural_key()),
                    ))
                    .with_source(err));
                }
            };

            match current_by_key.get(record.natural_key()) {
                None => changeset.to_insert.push(NewVersion {
                    natural_key: record.natural_key().to_string(),
                    attributes: record.attributes().clone(),
                    fingerprint,
                    version_no: 1,
                    effective_start: record.captured_at(),
                }),
                Some(_) if matches!(self.mode, SyncMode::DedupOnly) => {
                    changeset.unchanged += 1;
                }
                Some(version) if version.fingerprint == fingerprint => {
                    changeset.unchanged += 1;
                }
                Some(version) => {
                    changeset.to_insert.push(NewVersion {
                        natural_key: record.natural_key().to_string(),
                        attributes: record.attributes().clone(),
                        fingerprint,
                        version_no: version.version_no + 1,
                        effective_start: record.captured_at(),
                    });
                    changeset.to_expire.push(Expiry {
                        surrogate_id: version.surrogate_id,
                        effective_end: record.captured_at(),
                    });
                }
            }
        }

        Ok(changeset)
    }
}
