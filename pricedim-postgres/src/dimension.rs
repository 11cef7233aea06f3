use chrono::{DateTime, Utc};
use pg_escape::quote_identifier;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, PgPool};
use tracing::{debug, warn};

use crate::types::PgValue;

/// One fully resolved dimension row ready to be inserted.
#[derive(Debug, Clone)]
pub struct InsertVersion {
    pub natural_key: String,
    pub fingerprint: String,
    pub version_no: i32,
    pub effective_start: DateTime<Utc>,
    /// Attribute column names paired with their bind values. Names must have
    /// passed the reserved-column check before reaching this layer.
    pub attributes: Vec<(String, PgValue)>,
}

/// Returns the schema-qualified, quoted name of a dimension table.
fn qualified_table(table: &str) -> String {
    format!("etl.{}", quote_identifier(table))
}

/// Creates the dimension table with its metadata columns if it does not exist.
///
/// Attribute columns are added separately as staged batches introduce them;
/// the metadata columns created here are never altered afterwards.
pub async fn ensure_dimension_table(pool: &PgPool, table: &str) -> sqlx::Result<()> {
    sqlx::query("create schema if not exists etl")
        .execute(pool)
        .await?;

    let ddl = format!(
        r#"
        create table if not exists {table} (
            surrogate_id bigint generated always as identity primary key,
            natural_key text not null,
            fingerprint text not null,
            effective_start timestamptz not null,
            effective_end timestamptz,
            is_current boolean not null default true,
            version_no integer not null
        )
        "#,
        table = qualified_table(table),
    );
    sqlx::query(&ddl).execute(pool).await?;

    let index = format!(
        "create index if not exists {index_name} on {table} (natural_key) where is_current",
        index_name = quote_identifier(&format!("{table}_current_natural_key")),
        table = qualified_table(table),
    );
    sqlx::query(&index).execute(pool).await?;

    Ok(())
}

/// Returns the column names currently present on the dimension table.
pub async fn existing_columns(pool: &PgPool, table: &str) -> sqlx::Result<Vec<String>> {
    let columns: Vec<(String,)> = sqlx::query_as(
        r#"
        select column_name
        from information_schema.columns
        where table_schema = 'etl' and table_name = $1
        order by ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(columns.into_iter().map(|(name,)| name).collect())
}

/// Adds missing attribute columns to the dimension table.
///
/// Additive only; existing columns are never redefined or dropped.
pub async fn add_attribute_columns(
    pool: &PgPool,
    table: &str,
    columns: &[(String, &'static str)],
) -> sqlx::Result<()> {
    for (name, column_type) in columns {
        debug!("adding attribute column '{}' ({})", name, column_type);

        let ddl = format!(
            "alter table {table} add column if not exists {column} {column_type}",
            table = qualified_table(table),
            column = quote_identifier(name),
        );
        sqlx::query(&ddl).execute(pool).await?;
    }

    Ok(())
}

/// Fetches all current dimension rows, metadata and attribute columns alike.
///
/// Rows are returned raw; the caller decodes attribute columns by inspecting
/// each column's type information, since the attribute set is dynamic.
pub async fn fetch_current_version_rows(pool: &PgPool, table: &str) -> sqlx::Result<Vec<PgRow>> {
    let sql = format!(
        "select * from {table} where is_current order by natural_key",
        table = qualified_table(table),
    );

    sqlx::query(&sql).fetch_all(pool).await
}

/// Applies one batch of inserts and expirations inside a single transaction.
///
/// Expirations target rows by `surrogate_id`, never by natural key, so two
/// versions briefly sharing a natural key within the transaction cannot race.
/// An expiry that matches no current row means the caller's snapshot lost a
/// race to another writer; the whole transaction rolls back rather than
/// committing a successor next to a still-current predecessor.
/// Returns `(inserted, expired)` row counts.
pub async fn apply_changes(
    pool: &PgPool,
    table: &str,
    inserts: &[InsertVersion],
    expirations: &[(i64, DateTime<Utc>)],
) -> sqlx::Result<(u64, u64)> {
    let mut tx = pool.begin().await?;

    let mut inserted = 0u64;
    for insert in inserts {
        let mut columns = vec![
            "natural_key".to_string(),
            "fingerprint".to_string(),
            "effective_start".to_string(),
            "version_no".to_string(),
        ];
        let mut arguments = PgArguments::default();
        arguments
            .add(insert.natural_key.as_str())
            .map_err(sqlx::Error::Encode)?;
        arguments
            .add(insert.fingerprint.as_str())
            .map_err(sqlx::Error::Encode)?;
        arguments
            .add(insert.effective_start)
            .map_err(sqlx::Error::Encode)?;
        arguments
            .add(insert.version_no)
            .map_err(sqlx::Error::Encode)?;

        for (name, value) in &insert.attributes {
            columns.push(quote_identifier(name).into_owned());
            value.add_to(&mut arguments).map_err(sqlx::Error::Encode)?;
        }

        let placeholders = (1..=columns.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "insert into {table} ({columns}) values ({placeholders})",
            table = qualified_table(table),
            columns = columns.join(", "),
        );

        let result = sqlx::query_with(&sql, arguments).execute(&mut *tx).await?;
        inserted += result.rows_affected();
    }

    let mut expired = 0u64;
    let expire_sql = format!(
        "update {table} set effective_end = $2, is_current = false where surrogate_id = $1 and is_current",
        table = qualified_table(table),
    );
    for (surrogate_id, effective_end) in expirations {
        let result = sqlx::query(&expire_sql)
            .bind(surrogate_id)
            .bind(effective_end)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            warn!("expiry of surrogate id {surrogate_id} matched no current row, rolling back");
            return Err(sqlx::Error::RowNotFound);
        }
        expired += result.rows_affected();
    }

    tx.commit().await?;

    Ok((inserted, expired))
}
