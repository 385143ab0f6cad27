//! Aggregate rows and null-safe merge math.
//!
//! Hourly rows are mutated via read-merge-write, so the merge helpers here
//! must treat an absent bound as "no samples observed" rather than zero.
//! Invariants upheld by every merge path:
//! - `min_value <= max_value` whenever both are set
//! - `count == 0` implies both bounds are `None`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Null-safe minimum: an absent side contributes no information.
pub fn merge_min(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

/// Null-safe maximum: an absent side contributes no information.
pub fn merge_max(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

/// Grouping key for one hourly aggregate row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub day_bucket: String,
    pub hour: u32,
    pub metric_name: String,
    pub dimension_key: String,
}

/// Partial aggregate accumulated from one batch before it is merged into the
/// stored row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateDelta {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl AggregateDelta {
    /// Fold one event contribution in. The count always advances; the value
    /// only feeds sum/min/max when the event actually carried one.
    pub fn observe(&mut self, value: Option<f64>) {
        self.count += 1;
        if let Some(v) = value {
            self.sum += v;
            self.min = merge_min(self.min, Some(v));
            self.max = merge_max(self.max, Some(v));
        }
    }
}

/// One row per `(day_bucket, hour, metric_name, dimension_key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub day_bucket: String,
    pub hour: u32,
    pub metric_name: String,
    pub dimension_key: String,
    pub count: u64,
    pub sum_value: f64,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// Literal dimension map, denormalized for display.
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

impl HourlyAggregate {
    /// Fresh row for a key that had no stored aggregate yet.
    pub fn empty(key: &AggregateKey, dimensions: BTreeMap<String, String>) -> Self {
        Self {
            day_bucket: key.day_bucket.clone(),
            hour: key.hour,
            metric_name: key.metric_name.clone(),
            dimension_key: key.dimension_key.clone(),
            count: 0,
            sum_value: 0.0,
            min_value: None,
            max_value: None,
            dimensions,
        }
    }

    /// Merge a batch contribution into the stored totals (null-safe bounds).
    pub fn apply(&mut self, delta: &AggregateDelta) {
        self.count += delta.count;
        self.sum_value += delta.sum;
        self.min_value = merge_min(self.min_value, delta.min);
        self.max_value = merge_max(self.max_value, delta.max);
    }

    /// Mean of the observed values, `0.0` when the row holds no samples.
    pub fn average(&self) -> f64 {
        self.sum_value / self.count.max(1) as f64
    }
}

/// One row per `(month_bucket, day, metric_name, dimension_key)`, produced by
/// the daily rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub month_bucket: String,
    pub day: u32,
    pub metric_name: String,
    pub dimension_key: String,
    pub count: u64,
    pub sum_value: f64,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

impl DailyAggregate {
    /// Empty rollup row for a `(metric_name, dimension_key)` group.
    pub fn empty(
        month_bucket: impl Into<String>,
        day: u32,
        metric_name: impl Into<String>,
        dimension_key: impl Into<String>,
    ) -> Self {
        Self {
            month_bucket: month_bucket.into(),
            day,
            metric_name: metric_name.into(),
            dimension_key: dimension_key.into(),
            count: 0,
            sum_value: 0.0,
            min_value: None,
            max_value: None,
            dimensions: BTreeMap::new(),
        }
    }

    /// Fold one hourly row into the daily totals.
    pub fn absorb(&mut self, hourly: &HourlyAggregate) {
        self.count += hourly.count;
        self.sum_value += hourly.sum_value;
        self.min_value = merge_min(self.min_value, hourly.min_value);
        self.max_value = merge_max(self.max_value, hourly.max_value);
        if self.dimensions.is_empty() && !hourly.dimensions.is_empty() {
            self.dimensions = hourly.dimensions.clone();
        }
    }

    /// Mean of the observed values, `0.0` when the row holds no samples.
    pub fn average(&self) -> f64 {
        self.sum_value / self.count.max(1) as f64
    }
}
