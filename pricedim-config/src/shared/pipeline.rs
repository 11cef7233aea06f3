use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Config;
use crate::shared::PgConnectionConfig;

/// Unique identifier of a pipeline deployment.
///
/// A pipeline id isolates ledger entries and dimension state between
/// independent pipeline instances sharing the same database.
pub type PipelineId = u64;

/// How the dimension synchronizer treats records whose natural key already
/// exists with different attribute values.
///
/// The two modes diverge deliberately: the source scripts mixed both without
/// naming them, so the mode is a required, explicit configuration choice and
/// there is no serde default.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// SCD-2 behavior: changed records insert a new version and close out the
    /// superseded one with an effective-date window.
    Versioned,
    /// Insert only records whose natural key is wholly absent; existing rows
    /// are never touched, so stale attributes are never corrected.
    DedupOnly,
}

/// What to do when a staged attribute cannot be canonicalized for
/// fingerprinting.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationErrorPolicy {
    /// Drop the offending record and count it as skipped.
    Skip,
    /// Fail the whole batch.
    Abort,
}

impl Default for NormalizationErrorPolicy {
    fn default() -> Self {
        Self::Abort
    }
}

const fn default_stale_run_timeout_secs() -> u64 {
    3_600
}

const fn default_store_timeout_ms() -> u64 {
    30_000
}

/// Configuration for a pricedim pipeline.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    /// The unique identifier for this pipeline.
    pub id: PipelineId,
    /// The connection configuration for the Postgres instance holding the
    /// dimension and ledger tables.
    pub pg_connection: PgConnectionConfig,
    /// Name of the dimension table this pipeline loads.
    pub dimension_table: String,
    /// How existing natural keys with changed attributes are handled.
    pub mode: SyncMode,
    /// Ordered list of attribute names that participate in the content
    /// fingerprint. Volatile fields (capture timestamps, surrogate keys) must
    /// not appear here.
    pub compare_columns: Vec<String>,
    /// Policy for records whose attributes cannot be canonicalized.
    #[serde(default)]
    pub on_normalization_error: NormalizationErrorPolicy,
    /// Age after which a `started` ledger entry with no terminal status is
    /// swept to `failed`.
    #[serde(default = "default_stale_run_timeout_secs")]
    pub stale_run_timeout_secs: u64,
    /// Upper bound on a stage body's store work before the driver fails the
    /// run as timed out.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Config for PipelineConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["compare_columns"];
}

impl PipelineConfig {
    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dimension_table.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "dimension_table".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.compare_columns.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "compare_columns".to_string(),
                constraint: "must name at least one attribute".to_string(),
            });
        }

        if self.stale_run_timeout_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "stale_run_timeout_secs".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.store_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "store_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Errors produced by configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::TlsConfig;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            id: 1,
            pg_connection: PgConnectionConfig {
                host: "localhost".to_string(),
                port: 5432,
                name: "warehouse".to_string(),
                username: "etl".to_string(),
                password: None,
                tls: TlsConfig::disabled(),
            },
            dimension_table: "dim_product".to_string(),
            mode: SyncMode::Versioned,
            compare_columns: vec!["name".to_string(), "sale_price_vnd".to_string()],
            on_normalization_error: NormalizationErrorPolicy::default(),
            stale_run_timeout_secs: 3_600,
            store_timeout_ms: 30_000,
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn empty_dimension_table_is_rejected() {
        let mut config = test_config();
        config.dimension_table = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_compare_columns_are_rejected() {
        let mut config = test_config();
        config.compare_columns.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn sync_mode_has_no_default() {
        // The mode is a deliberate choice; deserializing a config without it
        // must fail rather than silently fall back to dedup-only semantics.
        let json = serde_json::json!({
            "id": 1,
            "pg_connection": {
                "host": "localhost",
                "port": 5432,
                "name": "warehouse",
                "username": "etl",
                "password": null,
                "tls": { "trusted_root_certs": "", "enabled": false }
            },
            "dimension_table": "dim_product",
            "compare_columns": ["name"]
        });
        let parsed = serde_json::from_value::<PipelineConfig>(json);
        assert!(parsed.is_err());
    }
}
