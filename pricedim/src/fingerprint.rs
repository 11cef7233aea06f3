//! Deterministic change fingerprints for staged records.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::DimResult;
use crate::types::StagedRecord;

/// Separator between canonical column values in the fingerprint input.
const COLUMN_SEPARATOR: &str = "||";

/// A lowercase hex SHA-256 digest over a record's compared attributes.
///
/// Equal fingerprints mean "no change" for the configured compare columns;
/// differing fingerprints mean a new version is due. The digest input is the
/// canonical text of each compared column, in configured column order, joined
/// by `||`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes fingerprints over a fixed, ordered set of compare columns.
///
/// The column list is pipeline configuration; all records in a batch are
/// fingerprinted over the same columns so digests stay comparable across
/// batches. A column absent from a record contributes the null canonical
/// form, making "omitted" and "explicitly null" indistinguishable on purpose.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    columns: Vec<String>,
}

impl Fingerprinter {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Computes the fingerprint of one staged record.
    ///
    /// Fails with [`crate::error::ErrorKind::NormalizationFailed`] when any
    /// compared value has no canonical form.
    pub fn fingerprint(&self, record: &StagedRecord) -> DimResult<Fingerprint> {
        let mut parts = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            parts.push(record.attribute(column).canonical_text()?);
        }

        let mut hasher = Sha256::new();
        hasher.update(parts.join(COLUMN_SEPARATOR).as_bytes());

        Ok(Fingerprint(format!("{:x}", hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::types::AttributeValue;

    fn record(attributes: &[(&str, AttributeValue)]) -> StagedRecord {
        let attributes = attributes
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect::<BTreeMap<_, _>>();
        StagedRecord::new("P1", attributes, Utc::now())
    }

    fn price_fingerprinter() -> Fingerprinter {
        Fingerprinter::new(vec![
            "sale_price_vnd".to_string(),
            "list_price_vnd".to_string(),
        ])
    }

    #[test]
    fn fingerprint_is_stable_across_attribute_insertion_order() {
        let fingerprinter = price_fingerprinter();
        let a = record(&[
            ("sale_price_vnd", AttributeValue::I64(100)),
            ("list_price_vnd", AttributeValue::I64(120)),
        ]);
        let b = record(&[
            ("list_price_vnd", AttributeValue::I64(120)),
            ("sale_price_vnd", AttributeValue::I64(100)),
        ]);

        assert_eq!(
            fingerprinter.fingerprint(&a).unwrap(),
            fingerprinter.fingerprint(&b).unwrap()
        );
    }

    #[test]
    fn omitted_column_equals_explicit_null() {
        let fingerprinter = price_fingerprinter();
        let omitted = record(&[("sale_price_vnd", AttributeValue::I64(100))]);
        let explicit = record(&[
            ("sale_price_vnd", AttributeValue::I64(100)),
            ("list_price_vnd", AttributeValue::Null),
        ]);

        assert_eq!(
            fingerprinter.fingerprint(&omitted).unwrap(),
            fingerprinter.fingerprint(&explicit).unwrap()
        );
    }

    #[test]
    fn single_value_change_alters_fingerprint() {
        let fingerprinter = price_fingerprinter();
        let before = record(&[
            ("sale_price_vnd", AttributeValue::I64(100)),
            ("list_price_vnd", AttributeValue::I64(120)),
        ]);
        let after = record(&[
            ("sale_price_vnd", AttributeValue::I64(101)),
            ("list_price_vnd", AttributeValue::I64(120)),
        ]);

        assert_ne!(
            fingerprinter.fingerprint(&before).unwrap(),
            fingerprinter.fingerprint(&after).unwrap()
        );
    }

    #[test]
    fn uncompared_columns_do_not_affect_the_digest() {
        let fingerprinter = price_fingerprinter();
        let bare = record(&[("sale_price_vnd", AttributeValue::I64(100))]);
        let extra = record(&[
            ("sale_price_vnd", AttributeValue::I64(100)),
            (
                "product_name",
                AttributeValue::String("Galaxy S25".to_string()),
            ),
        ]);

        assert_eq!(
            fingerprinter.fingerprint(&bare).unwrap(),
            fingerprinter.fingerprint(&extra).unwrap()
        );
    }
}
