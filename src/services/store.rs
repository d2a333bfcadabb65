//! Thin adapter over the SQLite store: row-level reads and writes, no ownership rules.
//!
//! Every query function is generic over the executor so the same statement runs
//! against the pool or inside a per-device transaction.

use crate::models::{DeviceEntity, EventEntity};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteExecutor, SqlitePool, Transaction};
use std::path::Path;
use std::time::Duration;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// How long a writer waits for the database lock before giving up with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DEVICE_COLUMNS: &str = "id, owner, name, push_token";
const EVENT_COLUMNS: &str = "device_id, id, kind, occurred_at, counterpart_number, \
     counterpart_name, message, last_updated";

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", path.display()))?;
        MIGRATOR.run(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database, used by tests.
    #[cfg(test)]
    pub async fn memory() -> anyhow::Result<Self> {
        use std::str::FromStr;
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self::new(pool))
    }

    #[inline]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Transactions opened here must write before they read: a deferred transaction
    /// upgrading from a read snapshot fails with `SQLITE_BUSY` instead of waiting.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

pub async fn find_device<'e, E>(executor: E, id: &str) -> Result<Option<DeviceEntity>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, DeviceEntity>(&format!(
        "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn devices_by_owner<'e, E>(
    executor: E,
    owner: &str,
) -> Result<Vec<DeviceEntity>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, DeviceEntity>(&format!(
        "SELECT {DEVICE_COLUMNS} FROM devices WHERE owner = ? ORDER BY id"
    ))
    .bind(owner)
    .fetch_all(executor)
    .await
}

pub async fn all_device_ids<'e, E>(executor: E) -> Result<Vec<String>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_scalar::<_, String>("SELECT id FROM devices ORDER BY id")
        .fetch_all(executor)
        .await
}

pub async fn distinct_owners<'e, E>(executor: E) -> Result<Vec<String>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_scalar::<_, String>("SELECT DISTINCT owner FROM devices ORDER BY owner")
        .fetch_all(executor)
        .await
}

/// Inserts the device or updates the supplied fields in place, but only while the
/// stored owner equals `owner`. Returns `None` when the row belongs to someone else.
pub async fn upsert_device<'e, E>(
    executor: E,
    id: &str,
    owner: &str,
    name: Option<&str>,
    push_token: Option<&str>,
) -> Result<Option<DeviceEntity>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, DeviceEntity>(&format!(
        r#"INSERT INTO devices (id, owner, name, push_token) VALUES (?, ?, ?, ?)
           ON CONFLICT (id) DO UPDATE SET
               name = COALESCE(excluded.name, devices.name),
               push_token = COALESCE(excluded.push_token, devices.push_token)
           WHERE devices.owner = excluded.owner
           RETURNING {DEVICE_COLUMNS}"#
    ))
    .bind(id)
    .bind(owner)
    .bind(name)
    .bind(push_token)
    .fetch_optional(executor)
    .await
}

pub async fn delete_device<'e, E>(executor: E, id: &str) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM devices WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_event<'e, E>(
    executor: E,
    device_id: &str,
    id: &str,
) -> Result<Option<EventEntity>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, EventEntity>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE device_id = ? AND id = ?"
    ))
    .bind(device_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Every event carrying `id`, whatever its device. Ids are only unique per device.
pub async fn events_by_id<'e, E>(executor: E, id: &str) -> Result<Vec<EventEntity>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, EventEntity>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE id = ? ORDER BY device_id"
    ))
    .bind(id)
    .fetch_all(executor)
    .await
}

pub async fn events_by_device<'e, E>(
    executor: E,
    device_id: &str,
) -> Result<Vec<EventEntity>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, EventEntity>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE device_id = ? ORDER BY occurred_at, id"
    ))
    .bind(device_id)
    .fetch_all(executor)
    .await
}

/// Insert or overwrite, keyed by `(device_id, id)`, but only while the event's device
/// exists and belongs to `owner`. Returns `false` when nothing was written.
pub async fn put_owned_event<'e, E>(
    executor: E,
    owner: &str,
    event: &EventEntity,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    // the WHERE clause keeps `ON CONFLICT` from parsing as a join constraint
    let result = sqlx::query(&format!(
        r#"INSERT INTO events ({EVENT_COLUMNS})
           SELECT ?, ?, ?, ?, ?, ?, ?, ?
           WHERE EXISTS (SELECT 1 FROM devices WHERE id = ? AND owner = ?)
           ON CONFLICT (device_id, id) DO UPDATE SET
               kind = excluded.kind,
               occurred_at = excluded.occurred_at,
               counterpart_number = excluded.counterpart_number,
               counterpart_name = excluded.counterpart_name,
               message = excluded.message,
               last_updated = excluded.last_updated"#
    ))
    .bind(&event.device_id)
    .bind(&event.id)
    .bind(event.kind)
    .bind(event.occurred_at)
    .bind(&event.counterpart_number)
    .bind(&event.counterpart_name)
    .bind(&event.message)
    .bind(event.last_updated)
    .bind(&event.device_id)
    .bind(owner)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_event<'e, E>(
    executor: E,
    device_id: &str,
    id: &str,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM events WHERE device_id = ? AND id = ?")
        .bind(device_id)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_events_of_device<'e, E>(
    executor: E,
    device_id: &str,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM events WHERE device_id = ?")
        .bind(device_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_events_before<'e, E>(
    executor: E,
    device_id: &str,
    limit: i64,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM events WHERE device_id = ? AND occurred_at < ?")
        .bind(device_id)
        .bind(limit)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
