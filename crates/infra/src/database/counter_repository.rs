//! SQLite-backed durable counter repository.
//!
//! One row per composite counter key with an atomic additive upsert, the
//! relational stand-in for the wide-column store's counter columns.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::ToSql;
use tidemark_core::CounterStore;
use tidemark_domain::Result;
use tokio::task;

use super::manager::DbManager;
use super::{map_join_error, map_sql_error};

const INCREMENT_SQL: &str = "INSERT INTO counters (counter_key, value, updated_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(counter_key) DO UPDATE SET
        value = value + excluded.value,
        updated_at = excluded.updated_at";

const GET_SQL: &str = "SELECT value FROM counters WHERE counter_key = ?1";

// Counter keys start with their hour bucket (`YYYY-MM-DD-HH:`), so a
// lexicographic cut on the first 13 characters ages out whole buckets.
const PURGE_SQL: &str = "DELETE FROM counters WHERE substr(counter_key, 1, 13) < ?1";

/// Durable counters backed by SQLite.
pub struct SqliteCounterRepository {
    db: Arc<DbManager>,
}

impl SqliteCounterRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Delete counters whose hour bucket is older than `cutoff_bucket`.
    pub async fn purge_before_bucket(&self, cutoff_bucket: &str) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let cutoff = cutoff_bucket.to_string();
        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let params: [&dyn ToSql; 1] = [&cutoff];
            conn.execute(PURGE_SQL, params.as_slice()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl CounterStore for SqliteCounterRepository {
    async fn increment(&self, counter_key: &str, delta: i64) -> Result<()> {
        let db = Arc::clone(&self.db);
        let counter_key = counter_key.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let updated_at = Utc::now().timestamp_millis();
            let params: [&dyn ToSql; 3] = [&counter_key, &delta, &updated_at];
            conn.execute(INCREMENT_SQL, params.as_slice()).map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get(&self, counter_key: &str) -> Result<i64> {
        let db = Arc::clone(&self.db);
        let counter_key = counter_key.to_string();

        task::spawn_blocking(move || -> Result<i64> {
            let conn = db.get_connection()?;
            let params: [&dyn ToSql; 1] = [&counter_key];
            match conn.query_row(GET_SQL, params.as_slice(), |row| row.get::<_, i64>(0)) {
                Ok(value) => Ok(value),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
                Err(err) => Err(map_sql_error(err)),
            }
        })
        .await
        .map_err(map_join_error)?
    }
}
