use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use crate::repository::{KeyValueStore, StorageError, UpdateFn};

use super::SqliteStore;

// SQLITE_FULL
const SQLITE_FULL_CODE: &str = "13";

const SELECT_VALUE: &str = r"
    SELECT value
    FROM kv_store
    WHERE key = ?1
    ";

const UPSERT_VALUE: &str = r"
    INSERT INTO kv_store (key, value, updated_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        updated_at = excluded.updated_at
    ";

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query(SELECT_VALUE)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_read_error)?;

        row.map(|row| {
            row.try_get("value")
                .map_err(|err| StorageError::Serialization(err.to_string()))
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(UPSERT_VALUE)
            .bind(key)
            .bind(value)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;

        Ok(())
    }

    async fn update(&self, key: &str, apply: UpdateFn<'_>) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(map_read_error)?;

        // IMMEDIATE takes the write lock up front so concurrent updaters,
        // including other processes on the same file, queue on busy_timeout.
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(map_write_error)?;

        let outcome = update_in_transaction(&mut conn, key, apply).await;
        let finish = if matches!(outcome, Ok(true)) {
            "COMMIT"
        } else {
            "ROLLBACK"
        };
        if let Err(err) = sqlx::query(finish).execute(&mut *conn).await {
            if finish == "COMMIT" {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            }
            return Err(map_write_error(err));
        }

        outcome
    }
}

async fn update_in_transaction(
    conn: &mut SqliteConnection,
    key: &str,
    apply: UpdateFn<'_>,
) -> Result<bool, StorageError> {
    let current: Option<String> = sqlx::query(SELECT_VALUE)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_read_error)?
        .map(|row| row.try_get("value"))
        .transpose()
        .map_err(|err| StorageError::Serialization(err.to_string()))?;

    let Some(value) = apply(current) else {
        return Ok(false);
    };

    sqlx::query(UPSERT_VALUE)
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(map_write_error)?;

    Ok(true)
}

fn map_read_error(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Unavailable(err.to_string())
        }
        other => StorageError::Connection(other.to_string()),
    }
}

fn map_write_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(SQLITE_FULL_CODE) {
            return StorageError::CapacityExceeded(db.message().to_string());
        }
    }
    map_read_error(err)
}
