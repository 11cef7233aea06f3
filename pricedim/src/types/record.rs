use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::bail;
use crate::error::{DimResult, ErrorKind};

/// A canonical attribute value as produced by the record normalizer.
///
/// [`AttributeValue`] is the closed value domain staged rows are coerced into
/// before they reach the change detector: scalars, timestamps, or nested JSON
/// for structured specification blobs.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
}

/// Shape of an attribute, used when evolving the dimension store's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Bool,
    Integer,
    Float,
    Text,
    Timestamp,
    Json,
}

impl AttributeValue {
    /// Returns the column shape this value requires.
    ///
    /// Nulls default to [`AttributeKind::Text`]: a column first seen as null
    /// has no better type information, and text accepts any later value's
    /// serialized form.
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Null => AttributeKind::Text,
            AttributeValue::Bool(_) => AttributeKind::Bool,
            AttributeValue::I64(_) => AttributeKind::Integer,
            AttributeValue::F64(_) => AttributeKind::Float,
            AttributeValue::String(_) => AttributeKind::Text,
            AttributeValue::Timestamp(_) => AttributeKind::Timestamp,
            AttributeValue::Json(_) => AttributeKind::Json,
        }
    }

    /// Returns the canonical text form used for fingerprinting.
    ///
    /// The canonicalization rule is fixed: null becomes the empty string,
    /// timestamps use a fixed second-precision format, strings are trimmed,
    /// and nested JSON is serialized with sorted keys. Two values that are
    /// semantically equal always canonicalize identically, independent of
    /// source ordering or locale.
    pub fn canonical_text(&self) -> DimResult<String> {
        match self {
            AttributeValue::Null => Ok(String::new()),
            AttributeValue::Bool(value) => Ok(value.to_string()),
            AttributeValue::I64(value) => Ok(value.to_string()),
            AttributeValue::F64(value) => {
                if !value.is_finite() {
                    bail!(
                        ErrorKind::NormalizationFailed,
                        "Attribute value is not canonicalizable",
                        format!("non-finite float {value} cannot be fingerprinted")
                    );
                }
                Ok(value.to_string())
            }
            AttributeValue::String(value) => Ok(value.trim().to_string()),
            AttributeValue::Timestamp(value) => {
                Ok(value.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            AttributeValue::Json(value) => Ok(canonical_json(value)),
        }
    }
}

/// Serializes a JSON value with object keys in sorted order, recursively.
fn canonical_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Object(map) => {
            let entries = map
                .iter()
                .collect::<BTreeMap<_, _>>()
                .into_iter()
                .map(|(key, value)| {
                    format!(
                        "{}:{}",
                        JsonValue::String(key.clone()),
                        canonical_json(value)
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{entries}}}")
        }
        JsonValue::Array(items) => {
            let entries = items
                .iter()
                .map(canonical_json)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{entries}]")
        }
        other => other.to_string(),
    }
}

/// One canonicalized row ready for loading into the dimension store.
///
/// Produced by the record normalizer, which also guarantees that natural keys
/// are unique within a batch. Immutable once handed to the change detector.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRecord {
    natural_key: String,
    attributes: BTreeMap<String, AttributeValue>,
    captured_at: DateTime<Utc>,
}

impl StagedRecord {
    pub fn new(
        natural_key: impl Into<String>,
        attributes: BTreeMap<String, AttributeValue>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            natural_key: natural_key.into(),
            attributes,
            captured_at,
        }
    }

    /// The business identifier of the entity this record describes.
    pub fn natural_key(&self) -> &str {
        &self.natural_key
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns the named attribute, treating an omitted key as null.
    pub fn attribute(&self, name: &str) -> &AttributeValue {
        self.attributes.get(name).unwrap_or(&AttributeValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn canonical_text_for_scalars() {
        assert_eq!(AttributeValue::Null.canonical_text().unwrap(), "");
        assert_eq!(
            AttributeValue::Bool(true).canonical_text().unwrap(),
            "true"
        );
        assert_eq!(
            AttributeValue::I64(28_990_000).canonical_text().unwrap(),
            "28990000"
        );
        assert_eq!(
            AttributeValue::String("  Galaxy S25 ".to_string())
                .canonical_text()
                .unwrap(),
            "Galaxy S25"
        );
    }

    #[test]
    fn canonical_text_for_timestamps_is_fixed_format() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            AttributeValue::Timestamp(ts).canonical_text().unwrap(),
            "2025-03-14 09:26:53"
        );
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let a = AttributeValue::Json(serde_json::json!({"b": {"d": 2, "c": 1}, "a": [1, 2]}));
        let b = AttributeValue::Json(serde_json::json!({"a": [1, 2], "b": {"c": 1, "d": 2}}));
        assert_eq!(
            a.canonical_text().unwrap(),
            b.canonical_text().unwrap()
        );
    }

    #[test]
    fn non_finite_floats_fail_normalization() {
        let err = AttributeValue::F64(f64::NAN).canonical_text().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NormalizationFailed);
    }

    #[test]
    fn missing_attribute_reads_as_null() {
        let record = StagedRecord::new("P1", BTreeMap::new(), Utc::now());
        assert_eq!(record.attribute("sale_price_vnd"), &AttributeValue::Null);
    }
}
