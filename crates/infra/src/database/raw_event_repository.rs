//! SQLite-backed raw event repository.
//!
//! Raw rows are the short-retention audit trail of the pipeline; every row
//! carries an `expires_at` stamped from the retention window so the sweeper
//! can emulate the store-level TTL.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{Row, ToSql};
use tidemark_core::RawEventStore;
use tidemark_domain::{EventType, MetricEvent, RetentionConfig, Result};
use tokio::task;
use uuid::Uuid;

use super::manager::DbManager;
use super::{map_join_error, map_sql_error};

const INSERT_EVENT_SQL: &str = "INSERT INTO raw_events (
        event_id, hour_bucket, event_type, event_name, user_id, request_id,
        path, method, status_code, duration_ms, course_id, lesson_id,
        metadata_json, created_at, expires_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)";

const EVENTS_BY_BUCKET_SQL: &str = "SELECT event_id, hour_bucket, event_type, event_name, user_id,
        request_id, path, method, status_code, duration_ms, course_id,
        lesson_id, metadata_json, created_at
    FROM raw_events
    WHERE hour_bucket = ?1
    ORDER BY event_id DESC
    LIMIT ?2";

const EVENTS_BY_BUCKET_AND_TYPE_SQL: &str = "SELECT event_id, hour_bucket, event_type, event_name, user_id,
        request_id, path, method, status_code, duration_ms, course_id,
        lesson_id, metadata_json, created_at
    FROM raw_events
    WHERE hour_bucket = ?1 AND event_type = ?2
    ORDER BY event_id DESC
    LIMIT ?3";

const PURGE_EXPIRED_SQL: &str = "DELETE FROM raw_events WHERE expires_at <= ?1";

/// Raw event rows backed by SQLite.
pub struct SqliteRawEventRepository {
    db: Arc<DbManager>,
    retention: Duration,
}

impl SqliteRawEventRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>, retention: &RetentionConfig) -> Self {
        Self { db, retention: Duration::days(retention.raw_days) }
    }

    /// Delete rows whose retention window has passed. Returns the number of
    /// rows removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let cutoff = now.timestamp_millis();
        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let params: [&dyn ToSql; 1] = [&cutoff];
            conn.execute(PURGE_EXPIRED_SQL, params.as_slice()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl RawEventStore for SqliteRawEventRepository {
    async fn insert_event(&self, event: &MetricEvent) -> Result<()> {
        let db = Arc::clone(&self.db);
        let event = event.clone();
        let expires_at = (event.created_at + self.retention).timestamp_millis();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let metadata_json = serde_json::to_string(&event.metadata)
                .unwrap_or_else(|_| "{}".to_string());

            let event_id = event.event_id.to_string();
            let event_type = event.event_type.as_str();
            let user_id = event.user_id.map(|id| id.to_string());
            let course_id = event.course_id.map(|id| id.to_string());
            let lesson_id = event.lesson_id.map(|id| id.to_string());
            let created_at = event.created_at.timestamp_millis();

            let params: [&dyn ToSql; 15] = [
                &event_id,
                &event.hour_bucket,
                &event_type,
                &event.event_name,
                &user_id,
                &event.request_id,
                &event.path,
                &event.method,
                &event.status_code,
                &event.duration_ms,
                &course_id,
                &lesson_id,
                &metadata_json,
                &created_at,
                &expires_at,
            ];

            conn.execute(INSERT_EVENT_SQL, params.as_slice()).map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get_events(
        &self,
        hour_bucket: &str,
        event_type: Option<EventType>,
        limit: usize,
    ) -> Result<Vec<MetricEvent>> {
        let db = Arc::clone(&self.db);
        let hour_bucket = hour_bucket.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        task::spawn_blocking(move || -> Result<Vec<MetricEvent>> {
            let conn = db.get_connection()?;
            let events = match event_type {
                Some(ty) => {
                    let mut stmt =
                        conn.prepare(EVENTS_BY_BUCKET_AND_TYPE_SQL).map_err(map_sql_error)?;
                    let type_label = ty.as_str();
                    let params: [&dyn ToSql; 3] = [&hour_bucket, &type_label, &limit];
                    let rows = stmt
                        .query_map(params.as_slice(), map_event_row)
                        .map_err(map_sql_error)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
                }
                None => {
                    let mut stmt = conn.prepare(EVENTS_BY_BUCKET_SQL).map_err(map_sql_error)?;
                    let params: [&dyn ToSql; 2] = [&hour_bucket, &limit];
                    let rows = stmt
                        .query_map(params.as_slice(), map_event_row)
                        .map_err(map_sql_error)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
                }
            };
            Ok(events)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<MetricEvent> {
    let event_id: String = row.get(0)?;
    let event_type: String = row.get(2)?;
    let metadata_json: String = row.get(12)?;
    let created_at_ms: i64 = row.get(13)?;

    Ok(MetricEvent {
        event_id: parse_uuid(0, &event_id)?,
        hour_bucket: row.get(1)?,
        event_type: EventType::parse(&event_type).ok_or_else(|| {
            conversion_error(2, format!("unknown event type: {event_type}"))
        })?,
        event_name: row.get(3)?,
        user_id: parse_optional_uuid(4, row.get(4)?)?,
        request_id: row.get(5)?,
        path: row.get(6)?,
        method: row.get(7)?,
        status_code: row.get(8)?,
        duration_ms: row.get(9)?,
        course_id: parse_optional_uuid(10, row.get(10)?)?,
        lesson_id: parse_optional_uuid(11, row.get(11)?)?,
        metadata: serde_json::from_str::<BTreeMap<String, String>>(&metadata_json)
            .unwrap_or_default(),
        created_at: DateTime::<Utc>::from_timestamp_millis(created_at_ms)
            .ok_or_else(|| conversion_error(13, format!("bad timestamp: {created_at_ms}")))?,
    })
}

fn parse_uuid(index: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|err| conversion_error(index, err.to_string()))
}

fn parse_optional_uuid(index: usize, value: Option<String>) -> rusqlite::Result<Option<Uuid>> {
    value.map(|value| parse_uuid(index, &value)).transpose()
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

#[cfg(test)]
mod tests {
    use chrono::SubsecRound;
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteRawEventRepository, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("tempdir created");
        let manager =
            Arc::new(DbManager::new(temp_dir.path().join("metrics.db"), 4).expect("db manager"));
        manager.run_migrations().expect("migrations run");
        let repo = SqliteRawEventRepository::new(Arc::clone(&manager), &RetentionConfig::default());
        (repo, manager, temp_dir)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn round_trips_full_event_context() {
        let (repo, _manager, _tmp) = setup().await;

        let user = Uuid::new_v4();
        let mut event = MetricEvent::request("GET", "/courses/:id", 200, 12.5);
        event.user_id = Some(user);
        event.request_id = Some("req-9".to_string());
        event.metadata.insert("source".to_string(), "middleware".to_string());

        repo.insert_event(&event).await.expect("insert succeeds");

        let events = repo
            .get_events(&event.hour_bucket, None, 10)
            .await
            .expect("events fetched");
        assert_eq!(events.len(), 1);
        let stored = &events[0];
        assert_eq!(stored.event_id, event.event_id);
        assert_eq!(stored.event_type, EventType::Request);
        assert_eq!(stored.user_id, Some(user));
        assert_eq!(stored.duration_ms, Some(12.5));
        assert_eq!(stored.metadata.get("source").map(String::as_str), Some("middleware"));
        assert_eq!(stored.created_at, event.created_at.trunc_subsecs(3));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn filters_by_type_and_orders_newest_first() {
        let (repo, _manager, _tmp) = setup().await;

        let first = MetricEvent::business("login");
        // UUIDv7 ordering is millisecond-granular; step past the boundary.
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = MetricEvent::business("login");
        let error = MetricEvent::error("TimeoutError");
        for event in [&first, &second, &error] {
            repo.insert_event(event).await.expect("insert succeeds");
        }

        let business = repo
            .get_events(&first.hour_bucket, Some(EventType::Business), 10)
            .await
            .expect("business events fetched");
        assert_eq!(business.len(), 2);
        assert_eq!(business[0].event_id, second.event_id);
        assert_eq!(business[1].event_id, first.event_id);

        let limited = repo
            .get_events(&first.hour_bucket, None, 1)
            .await
            .expect("limited fetch");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn purge_removes_only_expired_rows() {
        let (repo, _manager, _tmp) = setup().await;

        let fresh = MetricEvent::business("login");
        let mut stale = MetricEvent::business("login");
        stale.created_at = Utc::now() - Duration::days(30);
        stale.hour_bucket = tidemark_domain::hour_bucket(stale.created_at);

        repo.insert_event(&fresh).await.expect("fresh inserted");
        repo.insert_event(&stale).await.expect("stale inserted");

        let purged = repo.purge_expired(Utc::now()).await.expect("purge succeeds");
        assert_eq!(purged, 1);

        let remaining =
            repo.get_events(&fresh.hour_bucket, None, 10).await.expect("fetch remaining");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].event_id, fresh.event_id);
    }
}
