//! Read-side query service.
//!
//! Translates stored aggregates into dashboard DTOs. This side never
//! writes; when a dependency is unreachable the affected slice degrades to
//! zeroed/empty defaults so a partial outage costs dashboard completeness,
//! not availability.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tidemark_domain::buckets::{
    bucket_day_timestamp, bucket_hour_timestamp, day_bucket, hour_bucket, month_bucket,
};
use tidemark_domain::constants::{
    CACHE_KEY_PREFIX, DIM_METHOD, DIM_PATH, DIM_STATUS, METRIC_API_REQUEST,
    METRIC_COMMENT_CREATED, METRIC_COURSE_COMPLETED, METRIC_ENROLLMENT_CREATED,
    METRIC_LESSON_COMPLETED, METRIC_LESSON_STARTED, METRIC_LOGIN, METRIC_REACTION_ADDED,
    METRIC_REGISTRATION, METRIC_REQUEST_BY_METHOD, METRIC_REQUEST_BY_PATH,
    METRIC_REQUEST_BY_STATUS,
};
use tidemark_domain::{
    percent_trend, resolve_period_window, BusinessStats, ComponentHealth, CourseStats,
    DashboardMetrics, Granularity, HourlyAggregate, MetricsHealth, Period, RealtimeCounters,
    RequestStats, Result, TimeseriesPoint, UserStats, DEFAULT_DIMENSION_KEY,
};
use tracing::warn;

use crate::cache_ports::CounterCache;
use crate::emitter::MetricsEmitter;
use crate::probe_ports::SystemProbe;
use crate::store_ports::{DailyAggregateStore, HourlyAggregateStore, StoreHealth};

/// Dashboard read API over the stored aggregates.
pub struct QueryService {
    hourly: Arc<dyn HourlyAggregateStore>,
    daily: Arc<dyn DailyAggregateStore>,
    store_health: Arc<dyn StoreHealth>,
    cache: Option<Arc<dyn CounterCache>>,
    probe: Option<Arc<dyn SystemProbe>>,
    emitter: Option<Arc<MetricsEmitter>>,
}

impl QueryService {
    pub fn new(
        hourly: Arc<dyn HourlyAggregateStore>,
        daily: Arc<dyn DailyAggregateStore>,
        store_health: Arc<dyn StoreHealth>,
    ) -> Self {
        Self { hourly, daily, store_health, cache: None, probe: None, emitter: None }
    }

    /// Wire the optional real-time counter cache.
    pub fn with_cache(mut self, cache: Arc<dyn CounterCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Wire the system resource probe for health reports.
    pub fn with_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Wire the emitter whose stats the health report should include.
    pub fn with_emitter(mut self, emitter: Arc<MetricsEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Period summary with day-over-day trends.
    ///
    /// A malformed custom period is a caller error; store failures inside
    /// the window degrade to zeroed stats instead.
    pub async fn get_dashboard_metrics(
        &self,
        period: Period,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<DashboardMetrics> {
        let (start, end) = resolve_period_window(period, start, end, Utc::now())?;

        // The window's final day is "current"; the day before it anchors
        // the trend. For today/yesterday this is exactly the period day.
        let current_day = day_bucket(end - Duration::seconds(1));
        let previous_day = day_bucket(end - Duration::seconds(1) - Duration::days(1));

        let current_rows = self.day_rows(&current_day).await;
        let previous_rows = self.day_rows(&previous_day).await;

        let requests = request_stats_from_rows(&current_rows);
        let previous_requests = request_stats_from_rows(&previous_rows);
        let business = business_stats_from_rows(&current_rows);
        let previous_business = business_stats_from_rows(&previous_rows);

        Ok(DashboardMetrics {
            period,
            start,
            end,
            request_trend_pct: percent_trend(
                requests.total_requests as f64,
                previous_requests.total_requests as f64,
            ),
            business_trend_pct: percent_trend(
                business.total() as f64,
                previous_business.total() as f64,
            ),
            requests,
            business,
        })
    }

    /// Request stats for one day bucket.
    pub async fn get_request_metrics(&self, day_bucket: &str) -> RequestStats {
        request_stats_from_rows(&self.day_rows(day_bucket).await)
    }

    /// Business stats for one day bucket.
    pub async fn get_business_metrics(&self, day_bucket: &str) -> BusinessStats {
        business_stats_from_rows(&self.day_rows(day_bucket).await)
    }

    /// User-activity slice for one day bucket.
    pub async fn get_user_metrics(&self, day_bucket: &str) -> UserStats {
        let business = business_stats_from_rows(&self.day_rows(day_bucket).await);
        UserStats { logins: business.logins, registrations: business.registrations }
    }

    /// Course-activity slice for one day bucket.
    pub async fn get_course_metrics(&self, day_bucket: &str) -> CourseStats {
        let business = business_stats_from_rows(&self.day_rows(day_bucket).await);
        CourseStats {
            enrollments_created: business.enrollments_created,
            lessons_started: business.lessons_started,
            lessons_completed: business.lessons_completed,
            courses_completed: business.courses_completed,
            comments_created: business.comments_created,
            reactions_added: business.reactions_added,
        }
    }

    /// Average-value time series for an arbitrary metric name.
    ///
    /// Hourly granularity reads the day of `start`, daily reads the month
    /// of `start`; points outside `[start, end)` are trimmed and the rest
    /// are returned in ascending timestamp order.
    pub async fn get_timeseries(
        &self,
        metric_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Vec<TimeseriesPoint> {
        let mut points: Vec<TimeseriesPoint> = match granularity {
            Granularity::Hourly => {
                let bucket = day_bucket(start);
                let rows = match self.hourly.get_day(&bucket, Some(metric_name)).await {
                    Ok(rows) => rows,
                    Err(err) => {
                        warn!(error = %err, day_bucket = %bucket, metric_name, "hourly timeseries read failed");
                        Vec::new()
                    }
                };
                rows.iter()
                    .filter_map(|row| {
                        bucket_hour_timestamp(&row.day_bucket, row.hour).map(|timestamp| {
                            TimeseriesPoint { timestamp, value: row.average(), count: row.count }
                        })
                    })
                    .collect()
            }
            Granularity::Daily => {
                let bucket = month_bucket(start);
                let rows = match self.daily.get_month(&bucket, Some(metric_name)).await {
                    Ok(rows) => rows,
                    Err(err) => {
                        warn!(error = %err, month_bucket = %bucket, metric_name, "daily timeseries read failed");
                        Vec::new()
                    }
                };
                rows.iter()
                    .filter_map(|row| {
                        bucket_day_timestamp(&row.month_bucket, row.day).map(|timestamp| {
                            TimeseriesPoint { timestamp, value: row.average(), count: row.count }
                        })
                    })
                    .collect()
            }
        };

        points.retain(|point| point.timestamp >= start && point.timestamp < end);
        points.sort_by_key(|point| point.timestamp);
        points
    }

    /// Live counters for the current hour bucket; empty when the cache is
    /// absent or unreachable.
    pub async fn get_realtime_counters(&self) -> RealtimeCounters {
        let now = Utc::now();
        let bucket = hour_bucket(now);
        let prefix = format!("{CACHE_KEY_PREFIX}:{bucket}:");

        let counters = match &self.cache {
            Some(cache) => match cache.scan_prefix(&prefix).await {
                Ok(map) => map
                    .into_iter()
                    .map(|(key, value)| {
                        let name = key.strip_prefix(&prefix).unwrap_or(key.as_str()).to_string();
                        (name, value)
                    })
                    .collect(),
                Err(err) => {
                    warn!(error = %err, "counter cache scan failed; returning empty counters");
                    BTreeMap::new()
                }
            },
            None => BTreeMap::new(),
        };

        RealtimeCounters { hour_bucket: bucket, counters, timestamp: now }
    }

    /// Combined health report.
    ///
    /// Overall health requires a running emitter and a reachable store; the
    /// cache is optional and only shows up as a component entry.
    pub async fn get_health(&self) -> MetricsHealth {
        let emitter = self.emitter.as_ref().map(|emitter| emitter.stats());
        let emitter_running = emitter.as_ref().map(|stats| stats.running).unwrap_or(false);

        let mut components = Vec::new();
        let store_reachable = match self.store_health.ping().await {
            Ok(()) => {
                components.push(ComponentHealth::healthy("store"));
                true
            }
            Err(err) => {
                components.push(ComponentHealth::unhealthy("store", err.to_string()));
                false
            }
        };

        if let Some(cache) = &self.cache {
            match cache.ping().await {
                Ok(()) => components.push(ComponentHealth::healthy("cache")),
                Err(err) => components.push(ComponentHealth::unhealthy("cache", err.to_string())),
            }
        }

        MetricsHealth {
            healthy: emitter_running && store_reachable,
            emitter,
            components,
            system: self.probe.as_ref().map(|probe| probe.snapshot()),
            timestamp: Utc::now(),
        }
    }

    async fn day_rows(&self, day_bucket: &str) -> Vec<HourlyAggregate> {
        match self.hourly.get_day(day_bucket, None).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, day_bucket, "hourly read failed; returning empty slice");
                Vec::new()
            }
        }
    }
}

/// Bucket one day's rows into request stats.
fn request_stats_from_rows(rows: &[HourlyAggregate]) -> RequestStats {
    let mut stats = RequestStats::default();
    let mut total_count: u64 = 0;
    let mut total_sum: f64 = 0.0;
    let mut min_value: Option<f64> = None;
    let mut max_value: Option<f64> = None;

    for row in rows {
        match row.metric_name.as_str() {
            METRIC_API_REQUEST if row.dimension_key == DEFAULT_DIMENSION_KEY => {
                total_count += row.count;
                total_sum += row.sum_value;
                min_value = tidemark_domain::merge_min(min_value, row.min_value);
                max_value = tidemark_domain::merge_max(max_value, row.max_value);
            }
            METRIC_REQUEST_BY_STATUS => {
                if let Some(status) = row.dimensions.get(DIM_STATUS) {
                    *stats.by_status.entry(status.clone()).or_insert(0) += row.count;
                }
            }
            METRIC_REQUEST_BY_METHOD => {
                if let Some(method) = row.dimensions.get(DIM_METHOD) {
                    *stats.by_method.entry(method.clone()).or_insert(0) += row.count;
                }
            }
            METRIC_REQUEST_BY_PATH => {
                if let Some(path) = row.dimensions.get(DIM_PATH) {
                    *stats.by_path.entry(path.clone()).or_insert(0) += row.count;
                }
            }
            name if name.starts_with("error_") => {
                stats.error_count += row.count;
            }
            _ => {}
        }
    }

    stats.total_requests = total_count;
    stats.avg_response_time_ms = total_sum / total_count.max(1) as f64;
    stats.min_response_time_ms = min_value;
    stats.max_response_time_ms = max_value;
    stats
}

/// Bucket one day's rows into business stats; names outside the fixed
/// vocabulary are ignored by this view.
fn business_stats_from_rows(rows: &[HourlyAggregate]) -> BusinessStats {
    let mut stats = BusinessStats::default();

    for row in rows {
        if row.dimension_key != DEFAULT_DIMENSION_KEY {
            continue;
        }
        match row.metric_name.as_str() {
            METRIC_LOGIN => stats.logins += row.count,
            METRIC_REGISTRATION => stats.registrations += row.count,
            METRIC_ENROLLMENT_CREATED => stats.enrollments_created += row.count,
            METRIC_LESSON_STARTED => stats.lessons_started += row.count,
            METRIC_LESSON_COMPLETED => stats.lessons_completed += row.count,
            METRIC_COURSE_COMPLETED => stats.courses_completed += row.count,
            METRIC_COMMENT_CREATED => stats.comments_created += row.count,
            METRIC_REACTION_ADDED => stats.reactions_added += row.count,
            _ => {}
        }
    }

    stats
}
