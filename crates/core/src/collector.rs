//! Batch collector - durable write fan-out.
//!
//! Given an in-memory batch of events the collector performs three
//! independent write legs: raw-event inserts, hourly aggregation upserts and
//! counter increments (durable, plus the cache mirror when wired). Each
//! item's failure is logged and skipped so a batch is never abandoned
//! halfway; metrics are best-effort, not a source of truth.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tidemark_domain::constants::{
    CACHE_KEY_PREFIX, DIM_METHOD, DIM_PATH, DIM_STATUS, METRIC_REQUEST_BY_METHOD,
    METRIC_REQUEST_BY_PATH, METRIC_REQUEST_BY_STATUS,
};
use tidemark_domain::{
    dimension_key, AggregateDelta, AggregateKey, EventType, HourlyAggregate, MetricEvent, Result,
};
use tracing::{debug, warn};

use crate::cache_ports::CounterCache;
use crate::store_ports::{CounterStore, HourlyAggregateStore, RawEventStore};

/// Per-batch write tally, logged by the emitter worker after every flush.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BatchOutcome {
    pub events: usize,
    pub raw_inserted: usize,
    pub raw_failed: usize,
    pub aggregates_written: usize,
    pub aggregates_failed: usize,
    pub counters_written: usize,
    pub counters_failed: usize,
}

struct CacheBinding {
    cache: Arc<dyn CounterCache>,
    ttl: Duration,
}

/// Write-side fan-out for event batches.
pub struct MetricsCollector {
    raw: Arc<dyn RawEventStore>,
    hourly: Arc<dyn HourlyAggregateStore>,
    counters: Arc<dyn CounterStore>,
    cache: Option<CacheBinding>,
}

impl MetricsCollector {
    pub fn new(
        raw: Arc<dyn RawEventStore>,
        hourly: Arc<dyn HourlyAggregateStore>,
        counters: Arc<dyn CounterStore>,
    ) -> Self {
        Self { raw, hourly, counters, cache: None }
    }

    /// Mirror counter increments into a cache with the given expiry.
    pub fn with_cache(mut self, cache: Arc<dyn CounterCache>, ttl: Duration) -> Self {
        self.cache = Some(CacheBinding { cache, ttl });
        self
    }

    /// Persist one batch: raw rows, hourly aggregates, counters.
    ///
    /// The hourly leg is a read-merge-write and is not transactionally safe
    /// against concurrent writers of the same aggregation key. Correctness
    /// relies on a single consumer worker per process feeding this method;
    /// a parallel flush path needs a CAS/conditional-update at the storage
    /// layer or a serializing queue in front of it.
    pub async fn process_batch(&self, events: &[MetricEvent]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome { events: events.len(), ..BatchOutcome::default() };

        // Raw inserts, in arrival order.
        for event in events {
            match self.raw.insert_event(event).await {
                Ok(()) => outcome.raw_inserted += 1,
                Err(err) => {
                    outcome.raw_failed += 1;
                    warn!(
                        error = %err,
                        event_id = %event.event_id,
                        event_name = %event.event_name,
                        "raw event insert failed; skipping"
                    );
                }
            }
        }

        // Hourly aggregation: group contributions, then merge each group
        // into its stored row.
        let groups = group_contributions(events);
        for (key, delta, dims) in &groups {
            match self.merge_group(key, delta, dims.clone()).await {
                Ok(()) => outcome.aggregates_written += 1,
                Err(err) => {
                    outcome.aggregates_failed += 1;
                    warn!(
                        error = %err,
                        metric_name = %key.metric_name,
                        dimension_key = %key.dimension_key,
                        "hourly aggregate merge failed; skipping group"
                    );
                }
            }
        }

        // Counters: durable increments plus the cache mirror. The two views
        // are updated independently and may diverge under partial failure.
        let tallies = tally_counters(events);
        for (counter_key, delta) in &tallies {
            match self.counters.increment(counter_key, *delta).await {
                Ok(()) => outcome.counters_written += 1,
                Err(err) => {
                    outcome.counters_failed += 1;
                    warn!(error = %err, counter_key, "counter increment failed; skipping key");
                }
            }
        }

        if let Some(binding) = &self.cache {
            for (counter_key, delta) in &tallies {
                let cache_key = format!("{CACHE_KEY_PREFIX}:{counter_key}");
                if let Err(err) =
                    binding.cache.increment(&cache_key, *delta, binding.ttl).await
                {
                    debug!(error = %err, cache_key, "cache counter increment failed");
                }
            }
        }

        debug!(
            events = outcome.events,
            raw_inserted = outcome.raw_inserted,
            aggregates_written = outcome.aggregates_written,
            counters_written = outcome.counters_written,
            "batch processed"
        );

        Ok(outcome)
    }

    async fn merge_group(
        &self,
        key: &AggregateKey,
        delta: &AggregateDelta,
        dimensions: BTreeMap<String, String>,
    ) -> Result<()> {
        let mut row = match self.hourly.get(key).await? {
            Some(row) => row,
            None => HourlyAggregate::empty(key, dimensions),
        };
        row.apply(delta);
        self.hourly.upsert(&row).await
    }

    /// Diagnostics read: one day's hourly rows.
    pub async fn get_hourly_metrics(
        &self,
        day_bucket: &str,
        metric_name: Option<&str>,
    ) -> Result<Vec<HourlyAggregate>> {
        self.hourly.get_day(day_bucket, metric_name).await
    }

    /// Diagnostics read: raw events for an hour bucket.
    pub async fn get_raw_events(
        &self,
        hour_bucket: &str,
        event_type: Option<EventType>,
        limit: usize,
    ) -> Result<Vec<MetricEvent>> {
        self.raw.get_events(hour_bucket, event_type, limit).await
    }
}

/// Aggregation contributions of one event: always the global per-name count,
/// plus the request breakdowns when the relevant field is present.
fn contributions(event: &MetricEvent) -> Vec<(String, BTreeMap<String, String>)> {
    let mut out = vec![(event.event_name.clone(), BTreeMap::new())];

    if event.event_type == EventType::Request {
        if let Some(class) = event.status_class() {
            out.push((METRIC_REQUEST_BY_STATUS.to_string(), single(DIM_STATUS, class)));
        }
        if let Some(method) = &event.method {
            out.push((METRIC_REQUEST_BY_METHOD.to_string(), single(DIM_METHOD, method.clone())));
        }
        if let Some(path) = &event.path {
            out.push((METRIC_REQUEST_BY_PATH.to_string(), single(DIM_PATH, path.clone())));
        }
    }

    out
}

fn single(key: &str, value: String) -> BTreeMap<String, String> {
    let mut dims = BTreeMap::new();
    dims.insert(key.to_string(), value);
    dims
}

/// Counter suffixes of one event; the durable key prefixes each with the
/// event's hour bucket.
fn counter_suffixes(event: &MetricEvent) -> Vec<String> {
    let mut out = vec![format!("{}:total", event.event_type), event.event_name.clone()];

    if event.event_type == EventType::Request {
        if let Some(class) = event.status_class() {
            out.push(format!("status:{class}"));
        }
        if let Some(method) = &event.method {
            out.push(format!("method:{method}"));
        }
    }

    out
}

type Groups = Vec<(AggregateKey, AggregateDelta, BTreeMap<String, String>)>;

/// Group a batch by `(day_bucket, hour, metric_name, dimension_key)`,
/// folding each event's duration into the group's delta. First-seen order is
/// preserved so writes happen in arrival order within the batch.
fn group_contributions(events: &[MetricEvent]) -> Groups {
    let mut groups: Groups = Vec::new();
    let mut index: HashMap<AggregateKey, usize> = HashMap::new();

    for event in events {
        for (metric_name, dims) in contributions(event) {
            let key = AggregateKey {
                day_bucket: event.day_bucket(),
                hour: event.hour(),
                metric_name,
                dimension_key: dimension_key(&dims),
            };

            let slot = match index.get(&key) {
                Some(&slot) => slot,
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, AggregateDelta::default(), dims));
                    groups.len() - 1
                }
            };
            groups[slot].1.observe(event.duration_ms);
        }
    }

    groups
}

/// Accumulate counter deltas across a batch so each key gets one increment.
fn tally_counters(events: &[MetricEvent]) -> Vec<(String, i64)> {
    let mut tallies: Vec<(String, i64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        for suffix in counter_suffixes(event) {
            let counter_key = format!("{}:{suffix}", event.hour_bucket);
            match index.get(&counter_key) {
                Some(&slot) => tallies[slot].1 += 1,
                None => {
                    index.insert(counter_key.clone(), tallies.len());
                    tallies.push((counter_key, 1));
                }
            }
        }
    }

    tallies
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tidemark_domain::DEFAULT_DIMENSION_KEY;

    use super::*;

    #[test]
    fn request_event_contributes_breakdowns() {
        let event = MetricEvent::request("GET", "/courses/:id", 200, 12.0);
        let contribs = contributions(&event);

        let names: Vec<&str> = contribs.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["api_request", "request_by_status", "request_by_method", "request_by_path"]
        );

        let status_dims = &contribs[1].1;
        assert_eq!(status_dims.get(DIM_STATUS).map(String::as_str), Some("2xx"));
    }

    #[test]
    fn business_event_contributes_global_only() {
        let event = MetricEvent::business("enrollment_created");
        let contribs = contributions(&event);
        assert_eq!(contribs.len(), 1);
        assert_eq!(contribs[0].0, "enrollment_created");
        assert!(contribs[0].1.is_empty());
    }

    #[test]
    fn request_without_status_skips_status_breakdown() {
        let mut event = MetricEvent::request("GET", "/x", 200, 1.0);
        event.status_code = None;
        let names: Vec<String> =
            contributions(&event).into_iter().map(|(name, _)| name).collect();
        assert!(!names.iter().any(|n| n == METRIC_REQUEST_BY_STATUS));
        assert!(names.iter().any(|n| n == METRIC_REQUEST_BY_METHOD));
    }

    #[test]
    fn counter_suffixes_cover_type_name_and_request_breakdowns() {
        let event = MetricEvent::request("POST", "/enroll", 503, 4.0);
        let suffixes = counter_suffixes(&event);
        assert_eq!(
            suffixes,
            vec!["request:total", "api_request", "status:5xx", "method:POST"]
        );

        let business = MetricEvent::business("login");
        assert_eq!(counter_suffixes(&business), vec!["business:total", "login"]);
    }

    fn pinned(duration_ms: f64) -> MetricEvent {
        let t = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).single().unwrap();
        let mut event = MetricEvent::at(EventType::Request, "api_request", t);
        event.method = Some("GET".to_string());
        event.path = Some("/a".to_string());
        event.status_code = Some(200);
        event.duration_ms = Some(duration_ms);
        event
    }

    #[test]
    fn grouping_folds_same_key_events() {
        let events = vec![pinned(10.0), pinned(20.0)];
        let groups = group_contributions(&events);

        // api_request/default, status/2xx, method/GET, path//a
        assert_eq!(groups.len(), 4);
        let (key, delta, _) = &groups[0];
        assert_eq!(key.metric_name, "api_request");
        assert_eq!(key.dimension_key, DEFAULT_DIMENSION_KEY);
        assert_eq!(delta.count, 2);
        assert_eq!(delta.sum, 30.0);
        assert_eq!(delta.min, Some(10.0));
        assert_eq!(delta.max, Some(20.0));
    }

    #[test]
    fn tally_counters_sums_per_key() {
        let t = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).single().unwrap();
        let events = vec![
            MetricEvent::at(EventType::Business, "login", t),
            MetricEvent::at(EventType::Business, "login", t),
        ];
        let tallies = tally_counters(&events);

        assert_eq!(tallies.len(), 2);
        assert!(tallies[0].0.ends_with(":business:total"));
        assert_eq!(tallies[0].1, 2);
        assert!(tallies[1].0.ends_with(":login"));
        assert_eq!(tallies[1].1, 2);
    }
}
