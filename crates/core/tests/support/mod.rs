//! In-memory test doubles for the store, cache and probe ports.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tidemark_core::{
    CounterCache, CounterStore, DailyAggregateStore, HourlyAggregateStore, RawEventStore,
    StoreHealth, SystemProbe,
};
use tidemark_domain::{
    AggregateKey, DailyAggregate, EventType, HourlyAggregate, MetricEvent, Result, SystemSnapshot,
    TidemarkError,
};

fn poisoned() -> TidemarkError {
    TidemarkError::Internal("test double mutex poisoned".to_string())
}

/// Raw event store double with a failure switch.
#[derive(Default)]
pub struct MemoryRawEventStore {
    pub events: Mutex<Vec<MetricEvent>>,
    pub fail_inserts: AtomicBool,
}

impl MemoryRawEventStore {
    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RawEventStore for MemoryRawEventStore {
    async fn insert_event(&self, event: &MetricEvent) -> Result<()> {
        if self.fail_inserts.load(Ordering::Relaxed) {
            return Err(TidemarkError::Database("injected raw insert failure".to_string()));
        }
        self.events.lock().map_err(|_| poisoned())?.push(event.clone());
        Ok(())
    }

    async fn get_events(
        &self,
        hour_bucket: &str,
        event_type: Option<EventType>,
        limit: usize,
    ) -> Result<Vec<MetricEvent>> {
        let events = self.events.lock().map_err(|_| poisoned())?;
        let mut matching: Vec<MetricEvent> = events
            .iter()
            .filter(|event| event.hour_bucket == hour_bucket)
            .filter(|event| event_type.map(|ty| event.event_type == ty).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.event_id.cmp(&a.event_id));
        matching.truncate(limit);
        Ok(matching)
    }
}

/// Hourly aggregate store double.
#[derive(Default)]
pub struct MemoryHourlyStore {
    pub rows: Mutex<HashMap<(String, u32, String, String), HourlyAggregate>>,
    pub fail_upserts: AtomicBool,
    pub fail_reads: AtomicBool,
}

impl MemoryHourlyStore {
    pub fn seed(&self, row: HourlyAggregate) {
        let key =
            (row.day_bucket.clone(), row.hour, row.metric_name.clone(), row.dimension_key.clone());
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert(key, row);
        }
    }

    pub fn row(
        &self,
        day_bucket: &str,
        hour: u32,
        metric_name: &str,
        dimension_key: &str,
    ) -> Option<HourlyAggregate> {
        self.rows.lock().ok()?.get(&(
            day_bucket.to_string(),
            hour,
            metric_name.to_string(),
            dimension_key.to_string(),
        )).cloned()
    }
}

#[async_trait]
impl HourlyAggregateStore for MemoryHourlyStore {
    async fn get(&self, key: &AggregateKey) -> Result<Option<HourlyAggregate>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(TidemarkError::Database("injected hourly read failure".to_string()));
        }
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows
            .get(&(
                key.day_bucket.clone(),
                key.hour,
                key.metric_name.clone(),
                key.dimension_key.clone(),
            ))
            .cloned())
    }

    async fn upsert(&self, aggregate: &HourlyAggregate) -> Result<()> {
        if self.fail_upserts.load(Ordering::Relaxed) {
            return Err(TidemarkError::Database("injected hourly upsert failure".to_string()));
        }
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        rows.insert(
            (
                aggregate.day_bucket.clone(),
                aggregate.hour,
                aggregate.metric_name.clone(),
                aggregate.dimension_key.clone(),
            ),
            aggregate.clone(),
        );
        Ok(())
    }

    async fn get_day(
        &self,
        day_bucket: &str,
        metric_name: Option<&str>,
    ) -> Result<Vec<HourlyAggregate>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(TidemarkError::Database("injected hourly read failure".to_string()));
        }
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        let mut matching: Vec<HourlyAggregate> = rows
            .values()
            .filter(|row| row.day_bucket == day_bucket)
            .filter(|row| metric_name.map(|name| row.metric_name == name).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by_key(|row| row.hour);
        Ok(matching)
    }
}

/// Daily aggregate store double.
#[derive(Default)]
pub struct MemoryDailyStore {
    pub rows: Mutex<HashMap<(String, u32, String, String), DailyAggregate>>,
}

impl MemoryDailyStore {
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn row(
        &self,
        month_bucket: &str,
        day: u32,
        metric_name: &str,
        dimension_key: &str,
    ) -> Option<DailyAggregate> {
        self.rows.lock().ok()?.get(&(
            month_bucket.to_string(),
            day,
            metric_name.to_string(),
            dimension_key.to_string(),
        )).cloned()
    }
}

#[async_trait]
impl DailyAggregateStore for MemoryDailyStore {
    async fn upsert(&self, aggregate: &DailyAggregate) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        rows.insert(
            (
                aggregate.month_bucket.clone(),
                aggregate.day,
                aggregate.metric_name.clone(),
                aggregate.dimension_key.clone(),
            ),
            aggregate.clone(),
        );
        Ok(())
    }

    async fn get_month(
        &self,
        month_bucket: &str,
        metric_name: Option<&str>,
    ) -> Result<Vec<DailyAggregate>> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        let mut matching: Vec<DailyAggregate> = rows
            .values()
            .filter(|row| row.month_bucket == month_bucket)
            .filter(|row| metric_name.map(|name| row.metric_name == name).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by_key(|row| row.day);
        Ok(matching)
    }
}

/// Durable counter store double with a failure switch.
#[derive(Default)]
pub struct MemoryCounterStore {
    pub counters: Mutex<HashMap<String, i64>>,
    pub fail_increments: AtomicBool,
}

impl MemoryCounterStore {
    pub fn value(&self, counter_key: &str) -> i64 {
        self.counters.lock().ok().and_then(|c| c.get(counter_key).copied()).unwrap_or(0)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, counter_key: &str, delta: i64) -> Result<()> {
        if self.fail_increments.load(Ordering::Relaxed) {
            return Err(TidemarkError::Database("injected counter failure".to_string()));
        }
        let mut counters = self.counters.lock().map_err(|_| poisoned())?;
        *counters.entry(counter_key.to_string()).or_insert(0) += delta;
        Ok(())
    }

    async fn get(&self, counter_key: &str) -> Result<i64> {
        Ok(self.value(counter_key))
    }
}

/// Counter cache double (no expiry simulation; infra covers TTL behavior).
#[derive(Default)]
pub struct MemoryCacheDouble {
    pub counters: Mutex<BTreeMap<String, i64>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl CounterCache for MemoryCacheDouble {
    async fn increment(&self, key: &str, delta: i64, _ttl: Duration) -> Result<i64> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(TidemarkError::Cache("injected cache failure".to_string()));
        }
        let mut counters = self.counters.lock().map_err(|_| poisoned())?;
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += delta;
        Ok(*value)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<BTreeMap<String, i64>> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(TidemarkError::Cache("injected cache failure".to_string()));
        }
        let counters = self.counters.lock().map_err(|_| poisoned())?;
        Ok(counters
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), *value))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(TidemarkError::Cache("injected cache failure".to_string()));
        }
        Ok(())
    }
}

/// Store health double with a reachability switch.
#[derive(Default)]
pub struct StoreHealthDouble {
    pub unreachable: AtomicBool,
}

#[async_trait]
impl StoreHealth for StoreHealthDouble {
    async fn ping(&self) -> Result<()> {
        if self.unreachable.load(Ordering::Relaxed) {
            return Err(TidemarkError::Database("injected store outage".to_string()));
        }
        Ok(())
    }
}

/// Fixed system snapshot probe.
pub struct StaticProbe;

impl SystemProbe for StaticProbe {
    fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            cpu_percent: 12.5,
            memory_used_bytes: 1_024,
            memory_total_bytes: 4_096,
            disk_used_bytes: 10,
            disk_total_bytes: 100,
            process_count: 42,
        }
    }
}

/// Poll `predicate` every 10 ms until it holds or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, predicate: F) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
