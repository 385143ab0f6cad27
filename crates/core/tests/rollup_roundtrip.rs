//! Daily rollup behavior: grouping, idempotence, backfill, lifecycle.

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Duration as ChronoDuration, Utc};
use support::{wait_until, MemoryDailyStore, MemoryHourlyStore};
use tidemark_core::{
    DailyAggregateStore, HourlyAggregateStore, RollupService,
};
use tidemark_domain::buckets::{day_bucket, month_bucket, truncate_to_midnight};
use tidemark_domain::{HourlyAggregate, RollupConfig, DEFAULT_DIMENSION_KEY};

fn hourly_row(day: &str, hour: u32, metric: &str, count: u64, min: f64, max: f64) -> HourlyAggregate {
    HourlyAggregate {
        day_bucket: day.to_string(),
        hour,
        metric_name: metric.to_string(),
        dimension_key: DEFAULT_DIMENSION_KEY.to_string(),
        count,
        sum_value: (min + max) / 2.0 * count as f64,
        min_value: Some(min),
        max_value: Some(max),
        dimensions: BTreeMap::new(),
    }
}

fn service(
    config: RollupConfig,
) -> (Arc<RollupService>, Arc<MemoryHourlyStore>, Arc<MemoryDailyStore>) {
    let hourly = Arc::new(MemoryHourlyStore::default());
    let daily = Arc::new(MemoryDailyStore::default());
    let service = Arc::new(RollupService::new(
        Arc::clone(&hourly) as Arc<dyn HourlyAggregateStore>,
        Arc::clone(&daily) as Arc<dyn DailyAggregateStore>,
        config,
    ));
    (service, hourly, daily)
}

#[tokio::test(flavor = "multi_thread")]
async fn rollup_merges_a_full_day_into_one_row_per_group() {
    let (service, hourly, daily) = service(RollupConfig::default());

    // Target day as run_rollup computes it: midnight of (now - 2h).
    let target = truncate_to_midnight(Utc::now() - ChronoDuration::hours(2));
    let day = day_bucket(target);

    hourly.seed(hourly_row(&day, 1, "login", 5, 0.0, 0.0));
    hourly.seed(hourly_row(&day, 9, "login", 7, 0.0, 0.0));
    hourly.seed(hourly_row(&day, 9, "api_request", 3, 10.0, 30.0));
    hourly.seed(hourly_row(&day, 23, "api_request", 2, 5.0, 12.0));

    let outcome = service.run_rollup().await.expect("rollup succeeds");
    assert_eq!(outcome.day_bucket, day);
    assert_eq!(outcome.hourly_rows, 4);
    assert_eq!(outcome.groups_written, 2);
    assert_eq!(outcome.groups_failed, 0);

    let month = month_bucket(target);
    let login = daily
        .row(&month, target.day(), "login", DEFAULT_DIMENSION_KEY)
        .expect("login rollup row");
    assert_eq!(login.count, 12);

    let requests = daily
        .row(&month, target.day(), "api_request", DEFAULT_DIMENSION_KEY)
        .expect("api_request rollup row");
    assert_eq!(requests.count, 5);
    assert_eq!(requests.min_value, Some(5.0));
    assert_eq!(requests.max_value, Some(30.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn rollup_is_idempotent_against_unchanged_input() {
    let (service, hourly, daily) = service(RollupConfig::default());

    let target = truncate_to_midnight(Utc::now() - ChronoDuration::hours(2));
    let day = day_bucket(target);
    hourly.seed(hourly_row(&day, 8, "login", 4, 0.0, 0.0));

    service.run_rollup().await.expect("first rollup");
    let first = daily
        .row(&month_bucket(target), target.day(), "login", DEFAULT_DIMENSION_KEY)
        .expect("rollup row");

    service.run_rollup().await.expect("second rollup");
    let second = daily
        .row(&month_bucket(target), target.day(), "login", DEFAULT_DIMENSION_KEY)
        .expect("rollup row");

    // Re-running against unchanged hourly data rewrites the same totals.
    assert_eq!(first.count, second.count);
    assert_eq!(first.sum_value, second.sum_value);
    assert_eq!(daily.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn backfill_ignores_settle_delay_and_walks_back() {
    // A large delay would normally keep today out of reach.
    let (service, hourly, daily) = service(RollupConfig { delay_hours: 48, ..RollupConfig::default() });

    let today = truncate_to_midnight(Utc::now());
    let yesterday = today - ChronoDuration::days(1);
    hourly.seed(hourly_row(&day_bucket(today), 3, "login", 2, 0.0, 0.0));
    hourly.seed(hourly_row(&day_bucket(yesterday), 4, "login", 6, 0.0, 0.0));

    let outcomes = service.backfill(2).await.expect("backfill succeeds");
    assert_eq!(outcomes.len(), 2);

    assert!(daily.row(&month_bucket(today), today.day(), "login", DEFAULT_DIMENSION_KEY).is_some());
    assert!(daily
        .row(&month_bucket(yesterday), yesterday.day(), "login", DEFAULT_DIMENSION_KEY)
        .is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn rollup_loop_runs_on_start_and_stops_cleanly() {
    let (service, hourly, daily) = service(RollupConfig {
        interval_seconds: 3_600,
        delay_hours: 2,
    });

    let target = truncate_to_midnight(Utc::now() - ChronoDuration::hours(2));
    hourly.seed(hourly_row(&day_bucket(target), 12, "registration", 9, 0.0, 0.0));

    service.start().await;
    assert!(service.is_running().await);
    service.start().await; // idempotent

    // First cycle runs immediately.
    let daily_probe = Arc::clone(&daily);
    assert!(wait_until(Duration::from_secs(2), move || daily_probe.len() == 1).await);

    service.stop().await;
    assert!(!service.is_running().await);

    // Stopping again is a no-op.
    service.stop().await;
}
