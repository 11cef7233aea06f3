use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use pricedim_config::shared::{
    NormalizationErrorPolicy, PgConnectionConfig, PipelineConfig, SyncMode, TlsConfig,
};

use crate::types::{AttributeValue, StagedRecord};

/// Fixed capture time used by default so fingerprints and effective dates are
/// reproducible across test runs.
pub fn test_capture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
}

/// Builder for staged product records in tests.
#[derive(Debug, Clone)]
pub struct StagedRecordBuilder {
    natural_key: String,
    attributes: BTreeMap<String, AttributeValue>,
    captured_at: DateTime<Utc>,
}

impl StagedRecordBuilder {
    pub fn new(natural_key: &str) -> Self {
        Self {
            natural_key: natural_key.to_string(),
            attributes: BTreeMap::new(),
            captured_at: test_capture_time(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.attributes.insert(
            "product_name".to_string(),
            AttributeValue::String(name.to_string()),
        );
        self
    }

    pub fn sale_price(mut self, price: i64) -> Self {
        self.attributes
            .insert("sale_price_vnd".to_string(), AttributeValue::I64(price));
        self
    }

    pub fn attribute(mut self, name: &str, value: AttributeValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn build(self) -> StagedRecord {
        StagedRecord::new(self.natural_key, self.attributes, self.captured_at)
    }
}

/// A product record with just a sale price, the most common test fixture.
pub fn priced_record(natural_key: &str, price: i64) -> StagedRecord {
    StagedRecordBuilder::new(natural_key).sale_price(price).build()
}

/// A pipeline configuration wired for the in-memory store.
///
/// The connection settings are placeholders; tests using [`MemoryStore`]
/// never open them.
///
/// [`MemoryStore`]: crate::store::memory::MemoryStore
pub fn test_pipeline_config(mode: SyncMode) -> PipelineConfig {
    PipelineConfig {
        id: 1,
        pg_connection: PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "warehouse".to_string(),
            username: "pricedim".to_string(),
            password: None,
            tls: TlsConfig::disabled(),
        },
        dimension_table: "dim_product".to_string(),
        mode,
        compare_columns: vec!["product_name".to_string(), "sale_price_vnd".to_string()],
        on_normalization_error: NormalizationErrorPolicy::Abort,
        stale_run_timeout_secs: 3_600,
        store_timeout_ms: 30_000,
    }
}
