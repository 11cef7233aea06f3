use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::fingerprint::Fingerprint;
use crate::types::record::AttributeValue;

/// Metadata columns owned by the dimension store.
///
/// Staged attributes may never shadow these; a collision is a
/// [`crate::error::ErrorKind::SchemaConflict`] and fails the batch.
pub const RESERVED_COLUMNS: &[&str] = &[
    "surrogate_id",
    "natural_key",
    "fingerprint",
    "effective_start",
    "effective_end",
    "is_current",
    "version_no",
];

/// Returns true if the attribute name collides with a reserved metadata
/// column, case-insensitively.
pub fn is_reserved_column(name: &str) -> bool {
    RESERVED_COLUMNS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
}

/// One persisted row of the dimension table.
///
/// In versioned mode a natural key accumulates multiple versions over time,
/// of which at most one is current. In dedup-only mode every row stays at
/// version 1 and remains current forever.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionVersion {
    /// Assigned by the store on insert, never reused.
    pub surrogate_id: i64,
    pub natural_key: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub fingerprint: Fingerprint,
    pub effective_start: DateTime<Utc>,
    pub effective_end: Option<DateTime<Utc>>,
    pub is_current: bool,
    /// Monotonic per natural key, starting at 1.
    pub version_no: i32,
}

/// A fully classified row the synchronizer will insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub natural_key: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub fingerprint: Fingerprint,
    pub version_no: i32,
    /// Becomes `effective_start`; taken from the staged record's capture time.
    pub effective_start: DateTime<Utc>,
}

/// The close-out of a superseded current version.
///
/// Targets the prior version by surrogate id, never by natural key, so that
/// two versions briefly sharing a key inside one transaction cannot race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub surrogate_id: i64,
    /// Equals the successor version's `effective_start`.
    pub effective_end: DateTime<Utc>,
}

/// Row counts returned by an atomic apply call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub inserted: u64,
    pub expired: u64,
}
