use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::prelude::FromRow;

/// A row from the `etl.run_ledger` table.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntryRow {
    pub id: i64,
    pub pipeline_id: i64,
    pub batch_id: String,
    pub stage: String,
    pub source_table: String,
    pub target_table: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub records_inserted: i64,
    pub records_updated: i64,
    pub records_skipped: i64,
    pub error_summary: Option<String>,
}

/// Creates the run ledger table and its uniqueness constraint if missing.
///
/// The partial unique index on `(pipeline_id, stage, batch_id)` for `started`
/// rows is what rejects duplicate concurrent starts of the same stage within
/// one batch.
pub async fn ensure_ledger_table(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::query("create schema if not exists etl")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        create table if not exists etl.run_ledger (
            id bigint generated always as identity primary key,
            pipeline_id bigint not null,
            batch_id text not null,
            stage text not null,
            source_table text not null default '',
            target_table text not null default '',
            status text not null default 'started'
                check (status in ('started', 'success', 'failed')),
            start_time timestamptz not null default now(),
            end_time timestamptz,
            records_inserted bigint not null default 0,
            records_updated bigint not null default 0,
            records_skipped bigint not null default 0,
            error_summary text
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        create unique index if not exists run_ledger_single_start
        on etl.run_ledger (pipeline_id, stage, batch_id)
        where status = 'started'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts a new `started` ledger entry and returns its id.
pub async fn insert_started_run(
    pool: &PgPool,
    pipeline_id: i64,
    batch_id: &str,
    stage: &str,
    source_table: &str,
    target_table: &str,
) -> sqlx::Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into etl.run_ledger (pipeline_id, batch_id, stage, source_table, target_table, status)
        values ($1, $2, $3, $4, $5, 'started')
        returning id
        "#,
    )
    .bind(pipeline_id)
    .bind(batch_id)
    .bind(stage)
    .bind(source_table)
    .bind(target_table)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Terminates a `started` entry with the given status and counts.
///
/// Returns the number of rows updated: zero means the entry was already
/// terminal (or absent), which the caller treats as an idempotent no-op after
/// confirming the entry exists.
#[allow(clippy::too_many_arguments)]
pub async fn finish_run(
    pool: &PgPool,
    entry_id: i64,
    status: &str,
    inserted: i64,
    updated: i64,
    skipped: i64,
    error_summary: Option<&str>,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        update etl.run_ledger
        set status = $2,
            end_time = now(),
            records_inserted = $3,
            records_updated = $4,
            records_skipped = $5,
            error_summary = $6
        where id = $1 and status = 'started'
        "#,
    )
    .bind(entry_id)
    .bind(status)
    .bind(inserted)
    .bind(updated)
    .bind(skipped)
    .bind(error_summary)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Fetches the current status of a ledger entry, if it exists.
pub async fn fetch_run_status(pool: &PgPool, entry_id: i64) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar("select status from etl.run_ledger where id = $1")
        .bind(entry_id)
        .fetch_optional(pool)
        .await
}

/// Returns the most recent successful entry for a stage, by end time.
pub async fn latest_success_row(
    pool: &PgPool,
    pipeline_id: i64,
    stage: &str,
) -> sqlx::Result<Option<LedgerEntryRow>> {
    sqlx::query_as::<_, LedgerEntryRow>(
        r#"
        select id, pipeline_id, batch_id, stage, source_table, target_table, status,
               start_time, end_time, records_inserted, records_updated, records_skipped,
               error_summary
        from etl.run_ledger
        where pipeline_id = $1 and stage = $2 and status = 'success'
        order by end_time desc
        limit 1
        "#,
    )
    .bind(pipeline_id)
    .bind(stage)
    .fetch_optional(pool)
    .await
}

/// Marks `started` entries older than the cutoff as `failed`.
///
/// Returns the number of rows swept.
pub async fn sweep_stale_rows(
    pool: &PgPool,
    pipeline_id: i64,
    cutoff: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        update etl.run_ledger
        set status = 'failed',
            end_time = now(),
            error_summary = 'stale started entry swept after timeout'
        where pipeline_id = $1 and status = 'started' and start_time < $2
        "#,
    )
    .bind(pipeline_id)
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
