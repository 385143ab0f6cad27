//! Port interfaces for the durable metrics store.
//!
//! These traits define the boundary between the pipeline's business logic
//! and the storage implementation. The store is treated as an external,
//! already-concurrent-safe service: each call is an independent request,
//! there are no client-side transactions spanning statements.

use async_trait::async_trait;
use tidemark_domain::{
    AggregateKey, DailyAggregate, EventType, HourlyAggregate, MetricEvent, Result,
};

/// Raw event rows, partitioned by hour bucket, short retention.
#[async_trait]
pub trait RawEventStore: Send + Sync {
    /// Insert a single event row.
    async fn insert_event(&self, event: &MetricEvent) -> Result<()>;

    /// Fetch events for an hour bucket, optionally filtered by type,
    /// newest first, capped at `limit`.
    async fn get_events(
        &self,
        hour_bucket: &str,
        event_type: Option<EventType>,
        limit: usize,
    ) -> Result<Vec<MetricEvent>>;
}

/// Hourly aggregate rows keyed by `(day_bucket, hour, metric_name,
/// dimension_key)`.
#[async_trait]
pub trait HourlyAggregateStore: Send + Sync {
    /// Read one aggregate row, `None` when the key has never been written.
    async fn get(&self, key: &AggregateKey) -> Result<Option<HourlyAggregate>>;

    /// Write back a full row (replace-on-conflict).
    async fn upsert(&self, aggregate: &HourlyAggregate) -> Result<()>;

    /// All rows for a day, optionally filtered to one metric name.
    async fn get_day(
        &self,
        day_bucket: &str,
        metric_name: Option<&str>,
    ) -> Result<Vec<HourlyAggregate>>;
}

/// Daily aggregate rows keyed by `(month_bucket, day, metric_name,
/// dimension_key)`.
#[async_trait]
pub trait DailyAggregateStore: Send + Sync {
    /// Write back a full row (replace-on-conflict, so rollups stay
    /// idempotent against unchanged inputs).
    async fn upsert(&self, aggregate: &DailyAggregate) -> Result<()>;

    /// All rows for a month, optionally filtered to one metric name.
    async fn get_month(
        &self,
        month_bucket: &str,
        metric_name: Option<&str>,
    ) -> Result<Vec<DailyAggregate>>;
}

/// Durable monotonic counters keyed by a composite string.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add `delta` to the counter (creating it at zero first).
    async fn increment(&self, counter_key: &str, delta: i64) -> Result<()>;

    /// Current counter value; missing keys read as zero.
    async fn get(&self, counter_key: &str) -> Result<i64>;
}

/// Liveness probe against the store (`SELECT 1`-equivalent).
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<()>;
}
