//! SQLite-backed hourly and daily aggregate repositories.
//!
//! Both repositories write whole rows with replace-on-conflict upserts: the
//! collector owns the read-merge-write cycle for hourly rows, and the rollup
//! recomputes daily rows from source, so a row-level replace is always the
//! correct final step.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Row, ToSql};
use tidemark_core::{DailyAggregateStore, HourlyAggregateStore};
use tidemark_domain::{AggregateKey, DailyAggregate, HourlyAggregate, RetentionConfig, Result};
use tokio::task;

use super::manager::DbManager;
use super::{map_join_error, map_sql_error};

const GET_HOURLY_SQL: &str = "SELECT day_bucket, hour, metric_name, dimension_key, count,
        sum_value, min_value, max_value, dimensions_json
    FROM hourly_aggregates
    WHERE day_bucket = ?1 AND hour = ?2 AND metric_name = ?3 AND dimension_key = ?4";

const UPSERT_HOURLY_SQL: &str = "INSERT INTO hourly_aggregates (
        day_bucket, hour, metric_name, dimension_key, count, sum_value,
        min_value, max_value, dimensions_json, updated_at, expires_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(day_bucket, hour, metric_name, dimension_key) DO UPDATE SET
        count = excluded.count,
        sum_value = excluded.sum_value,
        min_value = excluded.min_value,
        max_value = excluded.max_value,
        dimensions_json = excluded.dimensions_json,
        updated_at = excluded.updated_at,
        expires_at = excluded.expires_at";

const HOURLY_DAY_SQL: &str = "SELECT day_bucket, hour, metric_name, dimension_key, count,
        sum_value, min_value, max_value, dimensions_json
    FROM hourly_aggregates
    WHERE day_bucket = ?1
    ORDER BY hour, metric_name, dimension_key";

const HOURLY_DAY_METRIC_SQL: &str = "SELECT day_bucket, hour, metric_name, dimension_key, count,
        sum_value, min_value, max_value, dimensions_json
    FROM hourly_aggregates
    WHERE day_bucket = ?1 AND metric_name = ?2
    ORDER BY hour, dimension_key";

const PURGE_HOURLY_SQL: &str = "DELETE FROM hourly_aggregates WHERE expires_at <= ?1";

const UPSERT_DAILY_SQL: &str = "INSERT INTO daily_aggregates (
        month_bucket, day, metric_name, dimension_key, count, sum_value,
        min_value, max_value, dimensions_json, updated_at, expires_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(month_bucket, day, metric_name, dimension_key) DO UPDATE SET
        count = excluded.count,
        sum_value = excluded.sum_value,
        min_value = excluded.min_value,
        max_value = excluded.max_value,
        dimensions_json = excluded.dimensions_json,
        updated_at = excluded.updated_at,
        expires_at = excluded.expires_at";

const DAILY_MONTH_SQL: &str = "SELECT month_bucket, day, metric_name, dimension_key, count,
        sum_value, min_value, max_value, dimensions_json
    FROM daily_aggregates
    WHERE month_bucket = ?1
    ORDER BY day, metric_name, dimension_key";

const DAILY_MONTH_METRIC_SQL: &str = "SELECT month_bucket, day, metric_name, dimension_key, count,
        sum_value, min_value, max_value, dimensions_json
    FROM daily_aggregates
    WHERE month_bucket = ?1 AND metric_name = ?2
    ORDER BY day, dimension_key";

const PURGE_DAILY_SQL: &str = "DELETE FROM daily_aggregates WHERE expires_at <= ?1";

/// Hourly aggregate rows backed by SQLite.
pub struct SqliteHourlyAggregateRepository {
    db: Arc<DbManager>,
    retention: Duration,
}

impl SqliteHourlyAggregateRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>, retention: &RetentionConfig) -> Self {
        Self { db, retention: Duration::days(retention.hourly_days) }
    }

    /// Delete rows whose retention window has passed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let cutoff = now.timestamp_millis();
        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let params: [&dyn ToSql; 1] = [&cutoff];
            conn.execute(PURGE_HOURLY_SQL, params.as_slice()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl HourlyAggregateStore for SqliteHourlyAggregateRepository {
    async fn get(&self, key: &AggregateKey) -> Result<Option<HourlyAggregate>> {
        let db = Arc::clone(&self.db);
        let key = key.clone();

        task::spawn_blocking(move || -> Result<Option<HourlyAggregate>> {
            let conn = db.get_connection()?;
            let params: [&dyn ToSql; 4] =
                [&key.day_bucket, &key.hour, &key.metric_name, &key.dimension_key];
            match conn.query_row(GET_HOURLY_SQL, params.as_slice(), map_hourly_row) {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(err) => Err(map_sql_error(err)),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn upsert(&self, aggregate: &HourlyAggregate) -> Result<()> {
        let db = Arc::clone(&self.db);
        let aggregate = aggregate.clone();
        let expires_at = (Utc::now() + self.retention).timestamp_millis();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let dimensions_json = serde_json::to_string(&aggregate.dimensions)
                .unwrap_or_else(|_| "{}".to_string());
            let count = i64::try_from(aggregate.count).unwrap_or(i64::MAX);
            let updated_at = Utc::now().timestamp_millis();

            let params: [&dyn ToSql; 11] = [
                &aggregate.day_bucket,
                &aggregate.hour,
                &aggregate.metric_name,
                &aggregate.dimension_key,
                &count,
                &aggregate.sum_value,
                &aggregate.min_value,
                &aggregate.max_value,
                &dimensions_json,
                &updated_at,
                &expires_at,
            ];

            conn.execute(UPSERT_HOURLY_SQL, params.as_slice()).map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get_day(
        &self,
        day_bucket: &str,
        metric_name: Option<&str>,
    ) -> Result<Vec<HourlyAggregate>> {
        let db = Arc::clone(&self.db);
        let day_bucket = day_bucket.to_string();
        let metric_name = metric_name.map(String::from);

        task::spawn_blocking(move || -> Result<Vec<HourlyAggregate>> {
            let conn = db.get_connection()?;
            let rows = match &metric_name {
                Some(metric) => {
                    let mut stmt = conn.prepare(HOURLY_DAY_METRIC_SQL).map_err(map_sql_error)?;
                    let params: [&dyn ToSql; 2] = [&day_bucket, metric];
                    let mapped = stmt
                        .query_map(params.as_slice(), map_hourly_row)
                        .map_err(map_sql_error)?;
                    mapped.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
                }
                None => {
                    let mut stmt = conn.prepare(HOURLY_DAY_SQL).map_err(map_sql_error)?;
                    let params: [&dyn ToSql; 1] = [&day_bucket];
                    let mapped = stmt
                        .query_map(params.as_slice(), map_hourly_row)
                        .map_err(map_sql_error)?;
                    mapped.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
                }
            };
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }
}

/// Daily aggregate rows backed by SQLite.
pub struct SqliteDailyAggregateRepository {
    db: Arc<DbManager>,
    retention: Duration,
}

impl SqliteDailyAggregateRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>, retention: &RetentionConfig) -> Self {
        Self { db, retention: Duration::days(retention.daily_days) }
    }

    /// Delete rows whose retention window has passed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let cutoff = now.timestamp_millis();
        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let params: [&dyn ToSql; 1] = [&cutoff];
            conn.execute(PURGE_DAILY_SQL, params.as_slice()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl DailyAggregateStore for SqliteDailyAggregateRepository {
    async fn upsert(&self, aggregate: &DailyAggregate) -> Result<()> {
        let db = Arc::clone(&self.db);
        let aggregate = aggregate.clone();
        let expires_at = (Utc::now() + self.retention).timestamp_millis();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let dimensions_json = serde_json::to_string(&aggregate.dimensions)
                .unwrap_or_else(|_| "{}".to_string());
            let count = i64::try_from(aggregate.count).unwrap_or(i64::MAX);
            let updated_at = Utc::now().timestamp_millis();

            let params: [&dyn ToSql; 11] = [
                &aggregate.month_bucket,
                &aggregate.day,
                &aggregate.metric_name,
                &aggregate.dimension_key,
                &count,
                &aggregate.sum_value,
                &aggregate.min_value,
                &aggregate.max_value,
                &dimensions_json,
                &updated_at,
                &expires_at,
            ];

            conn.execute(UPSERT_DAILY_SQL, params.as_slice()).map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get_month(
        &self,
        month_bucket: &str,
        metric_name: Option<&str>,
    ) -> Result<Vec<DailyAggregate>> {
        let db = Arc::clone(&self.db);
        let month_bucket = month_bucket.to_string();
        let metric_name = metric_name.map(String::from);

        task::spawn_blocking(move || -> Result<Vec<DailyAggregate>> {
            let conn = db.get_connection()?;
            let rows = match &metric_name {
                Some(metric) => {
                    let mut stmt = conn.prepare(DAILY_MONTH_METRIC_SQL).map_err(map_sql_error)?;
                    let params: [&dyn ToSql; 2] = [&month_bucket, metric];
                    let mapped = stmt
                        .query_map(params.as_slice(), map_daily_row)
                        .map_err(map_sql_error)?;
                    mapped.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
                }
                None => {
                    let mut stmt = conn.prepare(DAILY_MONTH_SQL).map_err(map_sql_error)?;
                    let params: [&dyn ToSql; 1] = [&month_bucket];
                    let mapped = stmt
                        .query_map(params.as_slice(), map_daily_row)
                        .map_err(map_sql_error)?;
                    mapped.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
                }
            };
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_hourly_row(row: &Row<'_>) -> rusqlite::Result<HourlyAggregate> {
    let dimensions_json: String = row.get(8)?;
    Ok(HourlyAggregate {
        day_bucket: row.get(0)?,
        hour: row.get(1)?,
        metric_name: row.get(2)?,
        dimension_key: row.get(3)?,
        count: row.get::<_, i64>(4)?.max(0) as u64,
        sum_value: row.get(5)?,
        min_value: row.get(6)?,
        max_value: row.get(7)?,
        dimensions: serde_json::from_str::<BTreeMap<String, String>>(&dimensions_json)
            .unwrap_or_default(),
    })
}

fn map_daily_row(row: &Row<'_>) -> rusqlite::Result<DailyAggregate> {
    let dimensions_json: String = row.get(8)?;
    Ok(DailyAggregate {
        month_bucket: row.get(0)?,
        day: row.get(1)?,
        metric_name: row.get(2)?,
        dimension_key: row.get(3)?,
        count: row.get::<_, i64>(4)?.max(0) as u64,
        sum_value: row.get(5)?,
        min_value: row.get(6)?,
        max_value: row.get(7)?,
        dimensions: serde_json::from_str::<BTreeMap<String, String>>(&dimensions_json)
            .unwrap_or_default(),
    })
}
