//! Configuration structures for the metrics pipeline.
//!
//! Defaults mirror the pipeline's documented behavior (10k queue, 100-event
//! batches, 1 s flush, 2 h rollup settle delay). Every section derives
//! `Deserialize` with defaults so partial config files stay valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub database: DatabaseConfig,
    pub emitter: EmitterConfig,
    pub rollup: RollupConfig,
    pub cache: CacheConfig,
    pub retention: RetentionConfig,
    pub ingress: IngressConfig,
}

/// Store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "tidemark.db".to_string(), pool_size: 4 }
    }
}

/// Emitter queue and batching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Bounded queue capacity; emissions beyond it are dropped.
    pub queue_capacity: usize,
    /// Flush as soon as this many events are buffered.
    pub batch_size: usize,
    /// Flush a non-empty buffer at least this often (milliseconds).
    pub flush_interval_ms: u64,
    /// How long `stop()` waits for the worker before aborting it
    /// (milliseconds).
    pub stop_timeout_ms: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            flush_interval_ms: 1_000,
            stop_timeout_ms: 5_000,
        }
    }
}

impl EmitterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Daily rollup scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    /// Seconds between rollup cycles.
    pub interval_seconds: u64,
    /// Hours to wait before a day is considered settled enough to roll up.
    pub delay_hours: i64,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self { interval_seconds: 3_600, delay_hours: 2 }
    }
}

impl RollupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Real-time counter cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Expiry applied on every counter increment (seconds).
    pub counter_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, counter_ttl_seconds: 7_200 }
    }
}

impl CacheConfig {
    pub fn counter_ttl(&self) -> Duration {
        Duration::from_secs(self.counter_ttl_seconds)
    }
}

/// Retention windows enforced by the sweeper (the store-boundary TTLs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub raw_days: i64,
    pub hourly_days: i64,
    pub daily_days: i64,
    /// Seconds between retention sweeps.
    pub sweep_interval_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { raw_days: 7, hourly_days: 90, daily_days: 730, sweep_interval_seconds: 3_600 }
    }
}

impl RetentionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Ingress middleware settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    /// Exact path prefixes skipped before any measurement happens.
    pub skip_paths: Vec<String>,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            skip_paths: vec![
                "/health".to_string(),
                "/metrics".to_string(),
                "/docs".to_string(),
                "/openapi.json".to_string(),
            ],
        }
    }
}
