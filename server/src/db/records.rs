//! Database operations for the records table.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use verlog_engine::state::{state_from_value, state_to_value};

use super::{Missing, StoredRecord};
use crate::error::{AppError, Result};

/// A row of the records table.
#[derive(Debug)]
struct RecordRow {
    state: serde_json::Value,
    log_data: Option<serde_json::Value>,
    log_version: Option<i64>,
    #[allow(dead_code)]
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RecordRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(RecordRow {
            state: row.try_get("state")?,
            log_data: row.try_get("log_data")?,
            log_version: row.try_get("log_version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl RecordRow {
    fn into_stored(self) -> Result<StoredRecord> {
        Ok(StoredRecord {
            state: state_from_value(self.state)?,
            log_data: self.log_data,
            version: self.log_version.map(|v| v as u64),
        })
    }
}

/// Get a record by collection and ID.
pub async fn get_record(
    pool: &PgPool,
    collection: &str,
    record_id: &str,
) -> Result<Option<StoredRecord>> {
    let row = sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT state, log_data, log_version, updated_at
        FROM records
        WHERE collection = $1 AND record_id = $2
        "#,
    )
    .bind(collection)
    .bind(record_id)
    .fetch_optional(pool)
    .await?;

    row.map(RecordRow::into_stored).transpose()
}

/// Change a record inside a transaction holding its row lock.
pub async fn mutate_record<T, F>(
    pool: &PgPool,
    collection: &str,
    record_id: &str,
    missing: Missing,
    apply: F,
) -> Result<T>
where
    F: FnOnce(&mut StoredRecord) -> Result<T> + Send,
    T: Send,
{
    let mut tx = pool.begin().await?;

    if missing == Missing::Create {
        sqlx::query(
            r#"
            INSERT INTO records (collection, record_id)
            VALUES ($1, $2)
            ON CONFLICT (collection, record_id) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(record_id)
        .execute(&mut *tx)
        .await?;
    }

    let row = sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT state, log_data, log_version, updated_at
        FROM records
        WHERE collection = $1 AND record_id = $2
        FOR UPDATE
        "#,
    )
    .bind(collection)
    .bind(record_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("record {}/{}", collection, record_id)))?;

    let mut stored = row.into_stored()?;
    let output = apply(&mut stored)?;

    sqlx::query(
        r#"
        UPDATE records
        SET state = $3, log_data = $4, log_version = $5, updated_at = now()
        WHERE collection = $1 AND record_id = $2
        "#,
    )
    .bind(collection)
    .bind(record_id)
    .bind(state_to_value(&stored.state))
    .bind(stored.log_data)
    .bind(stored.version.map(|v| v as i64))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::debug!(collection, record_id, "record saved");

    Ok(output)
}
