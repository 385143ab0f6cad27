//! Dashboard-shaped DTOs returned by the query service.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::buckets::truncate_to_midnight;
use crate::errors::{Result, TidemarkError};

/// Reporting period accepted by the dashboard summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Yesterday,
    Week,
    Month,
    Custom,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Yesterday => "yesterday",
            Period::Week => "week",
            Period::Month => "month",
            Period::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "today" => Some(Period::Today),
            "yesterday" => Some(Period::Yesterday),
            "week" => Some(Period::Week),
            "month" => Some(Period::Month),
            "custom" => Some(Period::Custom),
            _ => None,
        }
    }
}

/// Resolve a period into a concrete `[start, end)` window.
///
/// Today/yesterday operate on UTC day boundaries; week/month are rolling
/// windows ending at `now`. Custom requires both bounds from the caller.
pub fn resolve_period_window(
    period: Period,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight = truncate_to_midnight(now);
    match period {
        Period::Today => Ok((midnight, midnight + Duration::days(1))),
        Period::Yesterday => Ok((midnight - Duration::days(1), midnight)),
        Period::Week => Ok((now - Duration::days(7), now)),
        Period::Month => Ok((now - Duration::days(30), now)),
        Period::Custom => match (start, end) {
            (Some(start), Some(end)) if start < end => Ok((start, end)),
            (Some(_), Some(_)) => Err(TidemarkError::InvalidInput(
                "custom period start must be before end".to_string(),
            )),
            _ => Err(TidemarkError::InvalidInput(
                "custom period requires both start and end".to_string(),
            )),
        },
    }
}

/// Percentage change from `previous` to `current`.
///
/// A zero baseline reports 0% when nothing happened and 100% when activity
/// appeared from nothing, so dashboards never divide by zero.
pub fn percent_trend(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

/// Request-side stats for one day.
///
/// The percentile fields are carried for API shape compatibility but are
/// never populated: no histogram structure is collected anywhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: Option<f64>,
    pub max_response_time_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub error_count: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_method: BTreeMap<String, u64>,
    pub by_path: BTreeMap<String, u64>,
}

/// Business-event stats for one day, bucketed by the fixed vocabulary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessStats {
    pub logins: u64,
    pub registrations: u64,
    pub enrollments_created: u64,
    pub lessons_started: u64,
    pub lessons_completed: u64,
    pub courses_completed: u64,
    pub comments_created: u64,
    pub reactions_added: u64,
}

impl BusinessStats {
    pub fn total(&self) -> u64 {
        self.logins
            + self.registrations
            + self.enrollments_created
            + self.lessons_started
            + self.lessons_completed
            + self.courses_completed
            + self.comments_created
            + self.reactions_added
    }
}

/// User-activity slice of the business stats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub logins: u64,
    pub registrations: u64,
}

/// Course-activity slice of the business stats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseStats {
    pub enrollments_created: u64,
    pub lessons_started: u64,
    pub lessons_completed: u64,
    pub courses_completed: u64,
    pub comments_created: u64,
    pub reactions_added: u64,
}

/// Period summary with day-over-day trends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub requests: RequestStats,
    pub business: BusinessStats,
    pub request_trend_pct: f64,
    pub business_trend_pct: f64,
}

/// Granularity of a time series query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hourly,
    Daily,
}

/// One point of a metric time series. `value` is the per-bucket average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub count: u64,
}

/// Live counters for the current hour bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeCounters {
    pub hour_bucket: String,
    pub counters: BTreeMap<String, i64>,
    pub timestamp: DateTime<Utc>,
}

/// Emitter observability snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmitterSnapshot {
    pub running: bool,
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub queue_utilization_pct: f64,
    pub emitted: u64,
    pub processed: u64,
    pub dropped: u64,
    pub batches_flushed: u64,
    pub last_flush_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

/// Health of one dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub is_healthy: bool,
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_healthy: true, message: None }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), is_healthy: false, message: Some(message.into()) }
    }
}

/// System resource snapshot from the probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_total_bytes: u64,
    pub process_count: usize,
}

/// Combined health report for the metrics pipeline.
///
/// `healthy` requires a running emitter and a reachable store; the cache is
/// an optional dependency and never flips the overall flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsHealth {
    pub healthy: bool,
    pub emitter: Option<EmitterSnapshot>,
    pub components: Vec<ComponentHealth>,
    pub system: Option<SystemSnapshot>,
    pub timestamp: DateTime<Utc>,
}
