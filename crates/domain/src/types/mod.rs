//! Domain data types for the metrics pipeline.

pub mod aggregate;
pub mod dashboard;
pub mod event;

pub use aggregate::{
    merge_max, merge_min, AggregateDelta, AggregateKey, DailyAggregate, HourlyAggregate,
};
pub use dashboard::{
    percent_trend, resolve_period_window, BusinessStats, ComponentHealth, CourseStats,
    DashboardMetrics, EmitterSnapshot, Granularity, MetricsHealth, Period, RealtimeCounters,
    RequestStats, SystemSnapshot, TimeseriesPoint, UserStats,
};
pub use event::{EventType, MetricEvent};
