use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pricedim_config::shared::{
    DIMENSION_STORE_OPTIONS, IntoConnectOptions, PgConnectionConfig, PgConnectionOptions,
    RUN_LEDGER_OPTIONS,
};
use pricedim_postgres::dimension::{self, InsertVersion};
use pricedim_postgres::ledger;
use pricedim_postgres::types::PgValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};
use tracing::{debug, info};

use crate::bail;
use crate::dim_error;
use crate::error::{DimResult, ErrorKind};
use crate::fingerprint::Fingerprint;
use crate::store::dimension::{AttributeColumn, DimensionStore};
use crate::store::ledger::LedgerStore;
use crate::types::{
    ApplyStats, AttributeKind, AttributeValue, BatchId, DimensionVersion, Expiry, LedgerEntry,
    NewVersion, PipelineId, RunCounts, RunStatus, Stage, is_reserved_column,
};

/// Maximum number of connections in each pool.
///
/// Set to 2 to allow a ledger write to proceed while a dimension statement
/// is still in flight.
const MAX_POOL_CONNECTIONS: u32 = 2;

/// Duration after which idle connections are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a lazily connected pool with automatic idle connection cleanup.
///
/// This function returns immediately without establishing any connections.
/// Connections are created on demand when queries are executed and closed
/// after being idle, which suits a pipeline that runs on a schedule and sits
/// idle in between.
fn create_database_pool(config: &PgConnectionConfig, options: &PgConnectionOptions) -> PgPool {
    let options = config.with_db(Some(options));

    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(MAX_POOL_CONNECTIONS)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .connect_lazy_with(options)
}

/// Postgres-backed storage for the dimension table and the run ledger.
///
/// [`PostgresStore`] implements both [`DimensionStore`] and [`LedgerStore`]
/// against one database, using separate pools so ledger writes keep their
/// fail-fast session timeouts independent of long dimension transactions.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pipeline_id: PipelineId,
    table: String,
    dimension_pool: PgPool,
    ledger_pool: PgPool,
}

impl PostgresStore {
    /// Creates a store for one pipeline's dimension table.
    ///
    /// No connections are established here; call [`PostgresStore::prepare`]
    /// before first use to create the tables.
    pub fn new(pipeline_id: PipelineId, table: String, config: &PgConnectionConfig) -> Self {
        Self {
            pipeline_id,
            table,
            dimension_pool: create_database_pool(config, &DIMENSION_STORE_OPTIONS),
            ledger_pool: create_database_pool(config, &RUN_LEDGER_OPTIONS),
        }
    }

    /// Creates the dimension and ledger tables if they do not exist.
    pub async fn prepare(&self) -> DimResult<()> {
        dimension::ensure_dimension_table(&self.dimension_pool, &self.table).await?;
        ledger::ensure_ledger_table(&self.ledger_pool)
            .await
            .map_err(|err| {
                dim_error!(
                    ErrorKind::LedgerWriteFailed,
                    "Failed to create run ledger table",
                    source: err
                )
            })?;

        info!(table = %self.table, "prepared dimension and ledger tables");

        Ok(())
    }
}

fn column_type(kind: AttributeKind) -> &'static str {
    match kind {
        AttributeKind::Bool => "boolean",
        AttributeKind::Integer => "bigint",
        AttributeKind::Float => "double precision",
        AttributeKind::Text => "text",
        AttributeKind::Timestamp => "timestamptz",
        AttributeKind::Json => "jsonb",
    }
}

fn to_pg_value(value: &AttributeValue) -> PgValue {
    match value {
        AttributeValue::Null => PgValue::Null,
        AttributeValue::Bool(value) => PgValue::Bool(*value),
        AttributeValue::I64(value) => PgValue::I64(*value),
        AttributeValue::F64(value) => PgValue::F64(*value),
        AttributeValue::String(value) => PgValue::Text(value.clone()),
        AttributeValue::Timestamp(value) => PgValue::Timestamp(*value),
        AttributeValue::Json(value) => PgValue::Json(value.clone()),
    }
}

/// Decodes one attribute column from a fetched row based on its declared
/// Postgres type.
fn decode_attribute(row: &PgRow, index: usize, type_name: &str) -> DimResult<AttributeValue> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(AttributeValue::Bool),
        "INT2" | "INT4" | "INT8" => row
            .try_get::<Option<i64>, _>(index)?
            .map(AttributeValue::I64),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(index)?
            .map(AttributeValue::F64),
        "TIMESTAMPTZ" | "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(AttributeValue::Timestamp),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(AttributeValue::Json),
        _ => row
            .try_get::<Option<String>, _>(index)?
            .map(AttributeValue::String),
    };

    Ok(value.unwrap_or(AttributeValue::Null))
}

fn decode_version_row(row: &PgRow) -> DimResult<DimensionVersion> {
    let mut attributes = BTreeMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        if is_reserved_column(name) {
            continue;
        }

        let value = decode_attribute(row, index, column.type_info().name())?;
        attributes.insert(name.to_string(), value);
    }

    Ok(DimensionVersion {
        surrogate_id: row.try_get("surrogate_id")?,
        natural_key: row.try_get("natural_key")?,
        attributes,
        fingerprint: Fingerprint::new(row.try_get::<String, _>("fingerprint")?),
        effective_start: row.try_get("effective_start")?,
        effective_end: row.try_get("effective_end")?,
        is_current: row.try_get("is_current")?,
        version_no: row.try_get("version_no")?,
    })
}

fn decode_ledger_row(row: ledger::LedgerEntryRow) -> DimResult<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.id,
        batch_id: BatchId::new(row.batch_id),
        stage: Stage::parse(&row.stage)?,
        source_table: row.source_table,
        target_table: row.target_table,
        status: RunStatus::parse(&row.status)?,
        start_time: row.start_time,
        end_time: row.end_time,
        counts: RunCounts::new(
            row.records_inserted.max(0) as u64,
            row.records_updated.max(0) as u64,
            row.records_skipped.max(0) as u64,
        ),
        error_summary: row.error_summary,
    })
}

/// True when the error is a violation of the partial unique index that
/// guards against duplicate concurrent starts.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}

impl DimensionStore for PostgresStore {
    async fn ensure_attribute_columns(&self, columns: &[AttributeColumn]) -> DimResult<()> {
        for column in columns {
            if is_reserved_column(&column.name) {
                bail!(
                    ErrorKind::SchemaConflict,
                    "Attribute collides with a reserved column",
                    format!("'{}' is a dimension metadata column", column.name)
                );
            }
        }

        let existing = dimension::existing_columns(&self.dimension_pool, &self.table).await?;

        let missing = columns
            .iter()
            .filter(|column| !existing.iter().any(|name| name == &column.name))
            .map(|column| (column.name.clone(), column_type(column.kind)))
            .collect::<Vec<_>>();

        if !missing.is_empty() {
            debug!(
                table = %self.table,
                count = missing.len(),
                "evolving dimension table with new attribute columns"
            );
            dimension::add_attribute_columns(&self.dimension_pool, &self.table, &missing).await?;
        }

        Ok(())
    }

    async fn current_versions(&self) -> DimResult<Vec<DimensionVersion>> {
        let rows = dimension::fetch_current_version_rows(&self.dimension_pool, &self.table).await?;

        rows.iter().map(decode_version_row).collect()
    }

    async fn apply(&self, inserts: &[NewVersion], expirations: &[Expiry]) -> DimResult<ApplyStats> {
        let inserts = inserts
            .iter()
            .map(|insert| InsertVersion {
                natural_key: insert.natural_key.clone(),
                fingerprint: insert.fingerprint.as_str().to_string(),
                version_no: insert.version_no,
                effective_start: insert.effective_start,
                attributes: insert
                    .attributes
                    .iter()
                    .map(|(name, value)| (name.clone(), to_pg_value(value)))
                    .collect(),
            })
            .collect::<Vec<_>>();
        let expirations = expirations
            .iter()
            .map(|expiry| (expiry.surrogate_id, expiry.effective_end))
            .collect::<Vec<_>>();

        let (inserted, expired) =
            dimension::apply_changes(&self.dimension_pool, &self.table, &inserts, &expirations)
                .await
                .map_err(|err| {
                    dim_error!(
                        ErrorKind::AtomicApplyFailed,
                        "Dimension changeset was rolled back",
                        format!("table '{}'", self.table),
                        source: err
                    )
                })?;

        Ok(ApplyStats { inserted, expired })
    }
}

impl LedgerStore for PostgresStore {
    async fn start_run(
        &self,
        batch_id: &BatchId,
        stage: Stage,
        source_table: &str,
        target_table: &str,
    ) -> DimResult<i64> {
        ledger::insert_started_run(
            &self.ledger_pool,
            self.pipeline_id as i64,
            batch_id.as_str(),
            stage.as_str(),
            source_table,
            target_table,
        )
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                dim_error!(
                    ErrorKind::InvalidState,
                    "Stage is already running",
                    format!("batch '{batch_id}' stage '{stage}' has an open started entry"),
                    source: err
                )
            } else {
                dim_error!(
                    ErrorKind::LedgerWriteFailed,
                    "Failed to record run start",
                    source: err
                )
            }
        })
    }

    async fn finish_run(
        &self,
        entry_id: i64,
        status: RunStatus,
        counts: RunCounts,
        error_summary: Option<&str>,
    ) -> DimResult<()> {
        if !status.is_terminal() {
            bail!(
                ErrorKind::InvalidState,
                "Finish requires a terminal status",
                format!("cannot finish entry {entry_id} with status '{status}'")
            );
        }

        let updated = ledger::finish_run(
            &self.ledger_pool,
            entry_id,
            status.as_str(),
            counts.inserted as i64,
            counts.updated as i64,
            counts.skipped as i64,
            error_summary,
        )
        .await
        .map_err(|err| {
            dim_error!(
                ErrorKind::LedgerWriteFailed,
                "Failed to record run completion",
                source: err
            )
        })?;

        if updated > 0 {
            return Ok(());
        }

        // Nothing matched: either the entry is already terminal (idempotent
        // retry, keep the first outcome) or the id does not exist.
        let current = ledger::fetch_run_status(&self.ledger_pool, entry_id)
            .await
            .map_err(|err| {
                dim_error!(
                    ErrorKind::LedgerQueryFailed,
                    "Failed to read run status",
                    source: err
                )
            })?;

        match current {
            Some(_) => Ok(()),
            None => bail!(
                ErrorKind::InvalidState,
                "Ledger entry does not exist",
                format!("cannot finish unknown entry {entry_id}")
            ),
        }
    }

    async fn latest_success(&self, stage: Stage) -> DimResult<Option<LedgerEntry>> {
        let row = ledger::latest_success_row(&self.ledger_pool, self.pipeline_id as i64, stage.as_str())
            .await
            .map_err(|err| {
                dim_error!(
                    ErrorKind::LedgerQueryFailed,
                    "Failed to query latest successful run",
                    source: err
                )
            })?;

        row.map(decode_ledger_row).transpose()
    }

    async fn sweep_stale_runs(&self, cutoff: DateTime<Utc>) -> DimResult<u64> {
        ledger::sweep_stale_rows(&self.ledger_pool, self.pipeline_id as i64, cutoff)
            .await
            .map_err(|err| {
                dim_error!(
                    ErrorKind::LedgerWriteFailed,
                    "Failed to sweep stale runs",
                    source: err
                )
            })
    }
}
