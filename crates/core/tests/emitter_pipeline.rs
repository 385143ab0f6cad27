//! Emitter + collector pipeline behavior: backpressure, flush triggers,
//! lifecycle, and the 150-event end-to-end scenario.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use support::{
    wait_until, MemoryCounterStore, MemoryHourlyStore, MemoryRawEventStore,
};
use tidemark_core::{MetricsCollector, MetricsEmitter};
use tidemark_domain::{
    dimension_key, EmitterConfig, EventType, MetricEvent, DEFAULT_DIMENSION_KEY,
};

struct Pipeline {
    emitter: Arc<MetricsEmitter>,
    raw: Arc<MemoryRawEventStore>,
    hourly: Arc<MemoryHourlyStore>,
    counters: Arc<MemoryCounterStore>,
}

fn pipeline(config: EmitterConfig) -> Pipeline {
    let raw = Arc::new(MemoryRawEventStore::default());
    let hourly = Arc::new(MemoryHourlyStore::default());
    let counters = Arc::new(MemoryCounterStore::default());
    let collector = Arc::new(MetricsCollector::new(
        Arc::clone(&raw) as Arc<dyn tidemark_core::RawEventStore>,
        Arc::clone(&hourly) as Arc<dyn tidemark_core::HourlyAggregateStore>,
        Arc::clone(&counters) as Arc<dyn tidemark_core::CounterStore>,
    ));
    let emitter = Arc::new(MetricsEmitter::new(collector, config));
    Pipeline { emitter, raw, hourly, counters }
}

/// Request event pinned to a fixed hour so aggregate assertions cannot
/// straddle an hour boundary.
fn pinned_request(duration_ms: f64) -> MetricEvent {
    let t = Utc.with_ymd_and_hms(2026, 8, 7, 12, 10, 0).single().unwrap();
    let mut event = MetricEvent::at(EventType::Request, "api_request", t);
    event.method = Some("GET".to_string());
    event.path = Some("/courses/:id".to_string());
    event.status_code = Some(200);
    event.duration_ms = Some(duration_ms);
    event
}

#[tokio::test(flavor = "multi_thread")]
async fn backpressure_returns_false_and_counts_one_drop() {
    let p = pipeline(EmitterConfig {
        queue_capacity: 3,
        batch_size: 100,
        flush_interval_ms: 60_000,
        ..EmitterConfig::default()
    });

    // Worker intentionally not started: nothing flushes.
    for _ in 0..3 {
        assert!(p.emitter.emit(MetricEvent::business("login")));
    }
    assert!(!p.emitter.emit(MetricEvent::business("login")));

    let stats = p.emitter.stats();
    assert_eq!(stats.emitted, 3);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.queue_len, 3);
    assert_eq!(stats.queue_capacity, 3);
    assert_eq!(stats.queue_utilization_pct, 100.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn size_trigger_flushes_before_timeout() {
    let p = pipeline(EmitterConfig {
        queue_capacity: 100,
        batch_size: 3,
        flush_interval_ms: 60_000,
        ..EmitterConfig::default()
    });
    p.emitter.start().await;

    for _ in 0..3 {
        assert!(p.emitter.emit(MetricEvent::business("login")));
    }

    // One flush containing all three, long before the 60s interval.
    let emitter = Arc::clone(&p.emitter);
    assert!(
        wait_until(Duration::from_secs(2), move || {
            emitter.stats().batches_flushed == 1
        })
        .await
    );
    assert_eq!(p.emitter.stats().processed, 3);
    assert_eq!(p.raw.len(), 3);

    p.emitter.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn time_trigger_flushes_partial_batch() {
    let p = pipeline(EmitterConfig {
        queue_capacity: 100,
        batch_size: 100,
        flush_interval_ms: 50,
        ..EmitterConfig::default()
    });
    p.emitter.start().await;

    assert!(p.emitter.emit(MetricEvent::business("registration")));

    let emitter = Arc::clone(&p.emitter);
    assert!(
        wait_until(Duration::from_secs(2), move || emitter.stats().processed == 1).await
    );
    assert_eq!(p.emitter.stats().batches_flushed, 1);

    p.emitter.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn end_to_end_150_requests_aggregate_exactly() {
    let p = pipeline(EmitterConfig {
        queue_capacity: 1_000,
        batch_size: 100,
        flush_interval_ms: 200,
        ..EmitterConfig::default()
    });
    p.emitter.start().await;

    // Durations cycle through 10..=20 so min/max are exact.
    let mut expected_sum = 0.0;
    for i in 0..150u32 {
        let duration = f64::from(10 + (i % 11));
        expected_sum += duration;
        assert!(p.emitter.emit(pinned_request(duration)));
    }

    let emitter = Arc::clone(&p.emitter);
    assert!(
        wait_until(Duration::from_secs(5), move || emitter.stats().processed == 150).await
    );
    p.emitter.stop().await;

    // Exactly two flushes: 100 on the size trigger, 50 on the timeout.
    assert_eq!(p.emitter.stats().batches_flushed, 2);
    assert_eq!(p.raw.len(), 150);

    let global = p
        .hourly
        .row("2026-08-07", 12, "api_request", DEFAULT_DIMENSION_KEY)
        .expect("global aggregate row written");
    assert_eq!(global.count, 150);
    assert!((global.sum_value - expected_sum).abs() < 1e-9);
    assert_eq!(global.min_value, Some(10.0));
    assert_eq!(global.max_value, Some(20.0));

    let mut dims = std::collections::BTreeMap::new();
    dims.insert("status".to_string(), "2xx".to_string());
    let by_status = p
        .hourly
        .row("2026-08-07", 12, "request_by_status", &dimension_key(&dims))
        .expect("status breakdown row written");
    assert_eq!(by_status.count, 150);

    assert_eq!(p.counters.value("2026-08-07-12:request:total"), 150);
    assert_eq!(p.counters.value("2026-08-07-12:api_request"), 150);
    assert_eq!(p.counters.value("2026-08-07-12:status:2xx"), 150);
    assert_eq!(p.counters.value("2026-08-07-12:method:GET"), 150);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_drains_buffered_events() {
    let p = pipeline(EmitterConfig {
        queue_capacity: 100,
        batch_size: 50,
        flush_interval_ms: 60_000,
        ..EmitterConfig::default()
    });
    p.emitter.start().await;

    for _ in 0..5 {
        assert!(p.emitter.emit(MetricEvent::business("lesson_completed")));
    }

    // Neither trigger fires (5 < 50, interval is a minute out); stop must
    // flush what is buffered.
    p.emitter.stop().await;
    assert_eq!(p.emitter.stats().processed, 5);
    assert_eq!(p.raw.len(), 5);
    assert!(!p.emitter.is_running().await);

    // Stopping again is a no-op.
    p.emitter.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn start_is_idempotent_while_running() {
    let p = pipeline(EmitterConfig {
        queue_capacity: 10,
        batch_size: 1,
        flush_interval_ms: 50,
        ..EmitterConfig::default()
    });

    p.emitter.start().await;
    p.emitter.start().await; // warns, does not spawn a second worker
    assert!(p.emitter.is_running().await);

    assert!(p.emitter.emit(MetricEvent::business("login")));
    let emitter = Arc::clone(&p.emitter);
    assert!(
        wait_until(Duration::from_secs(2), move || emitter.stats().processed == 1).await
    );

    p.emitter.stop().await;
    assert!(!p.emitter.is_running().await);

    // Restart after a stop works.
    p.emitter.start().await;
    assert!(p.emitter.is_running().await);
    p.emitter.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn per_event_write_failures_do_not_stop_the_worker() {
    let p = pipeline(EmitterConfig {
        queue_capacity: 100,
        batch_size: 1,
        flush_interval_ms: 50,
        ..EmitterConfig::default()
    });
    p.emitter.start().await;

    // Raw inserts fail, but aggregation still lands and the worker stays up.
    p.raw.fail_inserts.store(true, Ordering::Relaxed);
    assert!(p.emitter.emit(MetricEvent::business("login")));

    let emitter = Arc::clone(&p.emitter);
    assert!(
        wait_until(Duration::from_secs(2), move || emitter.stats().processed == 1).await
    );
    assert_eq!(p.raw.len(), 0);
    assert!(p.emitter.is_running().await);

    // Recovery: subsequent batches persist raw rows again.
    p.raw.fail_inserts.store(false, Ordering::Relaxed);
    assert!(p.emitter.emit(MetricEvent::business("login")));
    let emitter = Arc::clone(&p.emitter);
    assert!(
        wait_until(Duration::from_secs(2), move || emitter.stats().processed == 2).await
    );
    assert_eq!(p.raw.len(), 1);

    p.emitter.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn emit_convenience_methods_fill_context() {
    let p = pipeline(EmitterConfig {
        queue_capacity: 100,
        batch_size: 10,
        flush_interval_ms: 60_000,
        ..EmitterConfig::default()
    });
    p.emitter.start().await;

    let user = uuid::Uuid::new_v4();
    assert!(p.emitter.emit_request(
        "GET",
        "/courses/:id",
        200,
        15.0,
        Some("req-1".to_string()),
        Some(user),
    ));
    assert!(p.emitter.emit_business("enrollment_created", Some(user), None, None));
    assert!(p.emitter.emit_error("ValueError", Some("/courses/:id".to_string()), None));

    p.emitter.stop().await;

    let events = p.raw.events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event_type, EventType::Request);
    assert_eq!(events[0].request_id.as_deref(), Some("req-1"));
    assert_eq!(events[0].user_id, Some(user));
    assert_eq!(events[1].event_name, "enrollment_created");
    assert_eq!(events[2].event_name, "error_valueerror");
}
