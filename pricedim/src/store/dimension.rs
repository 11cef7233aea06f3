use crate::error::DimResult;
use crate::types::{ApplyStats, AttributeKind, DimensionVersion, Expiry, NewVersion};

/// A dimension attribute column and the shape it needs in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeColumn {
    pub name: String,
    pub kind: AttributeKind,
}

/// Trait for reading and atomically mutating the versioned dimension table.
///
/// [`DimensionStore`] implementations own the physical layout of the
/// dimension: metadata columns, attribute columns and indexes. The
/// synchronizer only ever sees [`DimensionVersion`] rows and hands back
/// classified writes.
///
/// Implementations must ensure thread-safety and handle concurrent access to
/// the data.
pub trait DimensionStore {
    /// Adds any attribute columns the store does not have yet.
    ///
    /// Evolution is additive only: existing columns are never altered or
    /// dropped. A requested column that collides with a metadata column fails
    /// with [`crate::error::ErrorKind::SchemaConflict`].
    fn ensure_attribute_columns(
        &self,
        columns: &[AttributeColumn],
    ) -> impl Future<Output = DimResult<()>> + Send;

    /// Returns all currently effective versions, one per natural key.
    fn current_versions(&self) -> impl Future<Output = DimResult<Vec<DimensionVersion>>> + Send;

    /// Applies a classified changeset atomically.
    ///
    /// Either every insert and every expiry takes effect, or none do. The
    /// returned stats reflect rows actually written.
    fn apply(
        &self,
        inserts: &[NewVersion],
        expirations: &[Expiry],
    ) -> impl Future<Output = DimResult<ApplyStats>> + Send;
}
